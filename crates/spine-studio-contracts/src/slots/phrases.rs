/// One row of the resolver table: any phrase hit maps to `slots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseRule {
    pub label: String,
    pub phrases: Vec<String>,
    pub slots: Vec<String>,
}

impl PhraseRule {
    pub fn new(label: &str, phrases: &[&str], slots: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            phrases: phrases.iter().map(|item| (*item).to_string()).collect(),
            slots: slots.iter().map(|item| (*item).to_string()).collect(),
        }
    }
}

/// True when `phrase` occurs in `text` starting on a word boundary.
///
/// Both sides are expected to be lower-cased already. Matching on word
/// starts keeps "that" from hitting "hat" and "warm" from hitting "arm",
/// while still letting "shoes" hit "shoe".
pub fn mentions(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    text.match_indices(phrase).any(|(index, _)| {
        text[..index]
            .chars()
            .next_back()
            .map_or(true, |ch| !ch.is_alphanumeric())
    })
}

/// Resolver table, most specific first.
///
/// The character faces right, so its left side is the one drawn in front.
/// Forearm rows come before arm rows, footwear before legs and torso
/// clothing before arms ("armor" starts with "arm").
pub(crate) fn default_rules() -> Vec<PhraseRule> {
    vec![
        PhraseRule::new(
            "left-forearm",
            &[
                "left forearm",
                "left wrist",
                "left bracer",
                "left glove",
                "left gauntlet",
            ],
            &["front-bracer"],
        ),
        PhraseRule::new(
            "right-forearm",
            &[
                "right forearm",
                "right wrist",
                "right bracer",
                "right glove",
                "right gauntlet",
            ],
            &["rear-bracer"],
        ),
        PhraseRule::new(
            "left-foot",
            &["left foot", "left shoe", "left boot", "left sneaker"],
            &["front-foot"],
        ),
        PhraseRule::new(
            "right-foot",
            &["right foot", "right shoe", "right boot", "right sneaker"],
            &["rear-foot"],
        ),
        PhraseRule::new(
            "left-shin",
            &["left shin", "left knee", "left calf", "left lower leg"],
            &["front-shin"],
        ),
        PhraseRule::new(
            "right-shin",
            &["right shin", "right knee", "right calf", "right lower leg"],
            &["rear-shin"],
        ),
        PhraseRule::new(
            "left-thigh",
            &["left thigh", "left leg"],
            &["front-thigh"],
        ),
        PhraseRule::new(
            "right-thigh",
            &["right thigh", "right leg"],
            &["rear-thigh"],
        ),
        PhraseRule::new(
            "left-hand",
            &["left hand", "left fist"],
            &["front-fist-closed"],
        ),
        PhraseRule::new(
            "left-arm",
            &[
                "left upper arm",
                "left shoulder",
                "left bicep",
                "left sleeve",
                "left arm",
            ],
            &["front-upper-arm"],
        ),
        PhraseRule::new(
            "right-arm",
            &[
                "right upper arm",
                "right shoulder",
                "right bicep",
                "right sleeve",
                "right arm",
            ],
            &["rear-upper-arm"],
        ),
        PhraseRule::new(
            "footwear",
            &[
                "shoes", "shoe", "boots", "boot", "sneaker", "sandal", "footwear", "feet", "foot",
            ],
            &["front-foot", "rear-foot"],
        ),
        PhraseRule::new(
            "lower-leg",
            &["shin", "calf", "calves", "knee", "lower leg"],
            &["front-shin", "rear-shin"],
        ),
        PhraseRule::new(
            "forearm",
            &["forearm", "bracer", "wrist", "gauntlet", "glove"],
            &["front-bracer", "rear-bracer"],
        ),
        PhraseRule::new(
            "hand",
            &["fist", "hand", "knuckle", "palm", "finger"],
            &["front-fist-closed", "front-fist-open"],
        ),
        PhraseRule::new(
            "eyewear",
            &[
                "goggles",
                "sunglasses",
                "glasses",
                "spectacles",
                "eyewear",
                "visor",
                "shades",
            ],
            &["goggles"],
        ),
        PhraseRule::new(
            "torso",
            &[
                "armor", "armour", "jacket", "shirt", "vest", "chest", "torso", "body", "outfit",
                "coat", "uniform", "hoodie", "sweater", "cape", "clothes", "clothing",
            ],
            &["torso"],
        ),
        PhraseRule::new(
            "upper-arm",
            &["upper arm", "upper-arm", "shoulder", "bicep", "sleeve", "arm"],
            &["front-upper-arm", "rear-upper-arm"],
        ),
        PhraseRule::new(
            "upper-leg",
            &["thigh", "pants", "trouser", "shorts", "leg"],
            &["front-thigh", "rear-thigh"],
        ),
        PhraseRule::new(
            "neck",
            &["necklace", "scarf", "collar", "pendant", "neck"],
            &["neck"],
        ),
        PhraseRule::new("eyes", &["eye"], &["eye-indifferent", "eye-surprised"]),
        PhraseRule::new(
            "mouth",
            &["mouth", "smile", "lips", "teeth", "grin"],
            &["mouth-smile", "mouth-grind", "mouth-oooo"],
        ),
        PhraseRule::new(
            "weapon",
            &[
                "gun", "rifle", "pistol", "blaster", "weapon", "firearm", "cannon", "launcher",
            ],
            &["gun"],
        ),
        PhraseRule::new(
            "hoverboard",
            &["hoverboard", "skateboard", "surfboard", "board"],
            &["hoverboard-board"],
        ),
        PhraseRule::new(
            "thruster",
            &["thruster", "booster", "jet"],
            &["hoverboard-thruster"],
        ),
        PhraseRule::new("crosshair", &["crosshair", "reticle"], &["crosshair"]),
        PhraseRule::new(
            "head",
            &[
                "hat", "helmet", "hair", "head", "face", "cap", "crown", "mask", "beanie", "hood",
                "skull",
            ],
            &["head"],
        ),
    ]
}
