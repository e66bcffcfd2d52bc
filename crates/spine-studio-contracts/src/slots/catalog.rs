use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use super::phrases::{default_rules, mentions, PhraseRule};

/// Slot returned when nothing in a prompt points at a body part.
pub const DEFAULT_SLOT: &str = "head";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: String,
    pub base_priority: u32,
    pub keywords: Vec<String>,
}

impl SlotSpec {
    pub fn is_front(&self) -> bool {
        self.name.contains("front")
    }
}

/// Immutable lookup tables for the skeleton's named slots.
///
/// Built once and shared behind an `Arc`; nothing mutates it after
/// construction, so resolver and selector calls on different threads can
/// read it freely.
#[derive(Debug, Clone)]
pub struct SlotCatalog {
    slots: IndexMap<String, SlotSpec>,
    rules: Vec<PhraseRule>,
    manifest: Vec<String>,
}

impl SlotCatalog {
    pub fn new(
        slots: IndexMap<String, SlotSpec>,
        rules: Vec<PhraseRule>,
        manifest: Vec<String>,
    ) -> Self {
        Self {
            slots,
            rules,
            manifest,
        }
    }

    /// The spineboy rig: slot priorities, selector keywords and resolver rules.
    pub fn spineboy() -> Self {
        let slots = default_slots();
        let manifest = slots
            .keys()
            .map(|name| format!("{name}.png"))
            .collect::<Vec<String>>();
        Self::new(slots, default_rules(), manifest)
    }

    pub fn shared() -> Arc<SlotCatalog> {
        static SHARED: OnceLock<Arc<SlotCatalog>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(SlotCatalog::spineboy()))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<&SlotSpec> {
        self.slots.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn slots(&self) -> impl Iterator<Item = &SlotSpec> {
        self.slots.values()
    }

    /// Names missing from the table carry no priority at all.
    pub fn base_priority(&self, name: &str) -> u32 {
        self.get(name).map(|spec| spec.base_priority).unwrap_or(0)
    }

    pub fn keywords(&self, name: &str) -> &[String] {
        self.get(name)
            .map(|spec| spec.keywords.as_slice())
            .unwrap_or(&[])
    }

    pub fn rules(&self) -> &[PhraseRule] {
        &self.rules
    }

    /// Expected system image filenames, in manifest order.
    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    /// First rule (in table order) with a phrase mentioned in `prompt`.
    pub fn match_rule(&self, prompt: &str) -> Option<&PhraseRule> {
        let lowered = prompt.to_ascii_lowercase();
        self.rules.iter().find(|rule| {
            rule.phrases
                .iter()
                .any(|phrase| mentions(&lowered, phrase))
        })
    }

    /// Parses a free-text slot list such as `"front-foot, rear-foot"`.
    ///
    /// Unknown names are dropped and duplicates collapse onto their first
    /// occurrence. The result may be empty.
    pub fn parse_slot_list(&self, text: &str) -> Vec<String> {
        let mut slots: Vec<String> = Vec::new();
        for raw in text.split(|ch: char| ch == ',' || ch == '\n' || ch == ';') {
            let candidate = raw
                .trim()
                .trim_start_matches(|ch: char| ch == '-' || ch == '*' || ch.is_whitespace())
                .trim_matches(|ch: char| ch == '"' || ch == '\'' || ch == '`' || ch == '.')
                .trim()
                .to_ascii_lowercase();
            if candidate.is_empty() || !self.contains(&candidate) {
                continue;
            }
            if !slots.contains(&candidate) {
                slots.push(candidate);
            }
        }
        slots
    }
}

fn default_slots() -> IndexMap<String, SlotSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, base_priority: u32, keywords: &[&str]| {
        map.insert(
            name.to_string(),
            SlotSpec {
                name: name.to_string(),
                base_priority,
                keywords: keywords.iter().map(|item| (*item).to_string()).collect(),
            },
        );
    };

    insert(
        "head",
        10,
        &[
            "head", "face", "skull", "helmet", "hat", "hair", "crown", "cap", "mask", "visor",
            "headpiece", "headband",
        ],
    );
    insert(
        "torso",
        10,
        &[
            "torso", "body", "chest", "shirt", "armor", "jacket", "vest", "clothing", "outfit",
            "uniform", "attire", "garment",
        ],
    );
    insert(
        "neck",
        8,
        &["neck", "collar", "necklace", "throat", "chain", "pendant"],
    );
    insert(
        "front-thigh",
        10,
        &["thigh", "leg", "upper-leg", "quad", "pants", "trouser", "upper", "limb"],
    );
    insert(
        "front-shin",
        8,
        &["shin", "lower-leg", "calf", "knee", "pants", "trouser", "lower", "limb"],
    );
    insert(
        "front-foot",
        6,
        &[
            "foot", "feet", "shoe", "boot", "footwear", "sneaker", "sandal", "sole", "toe", "heel",
        ],
    );
    insert(
        "rear-thigh",
        9,
        &["thigh", "leg", "upper-leg", "quad", "pants", "trouser", "upper", "limb"],
    );
    insert(
        "rear-shin",
        7,
        &["shin", "lower-leg", "calf", "knee", "pants", "trouser", "lower", "limb"],
    );
    insert(
        "rear-foot",
        5,
        &[
            "foot", "feet", "shoe", "boot", "footwear", "sneaker", "sandal", "sole", "toe", "heel",
        ],
    );
    insert(
        "front-upper-arm",
        10,
        &["arm", "upper-arm", "shoulder", "bicep", "sleeve", "armband", "upper", "muscle"],
    );
    insert(
        "rear-upper-arm",
        9,
        &["arm", "upper-arm", "shoulder", "bicep", "sleeve", "armband", "upper", "muscle"],
    );
    insert(
        "front-fist-closed",
        8,
        &["fist", "hand", "closed", "punch", "knuckle", "grip", "grasp", "clutch", "clench"],
    );
    insert(
        "front-fist-open",
        8,
        &["fist", "hand", "open", "palm", "finger", "spread", "reach", "gesture", "wave"],
    );
    insert(
        "front-bracer",
        7,
        &[
            "bracer", "forearm", "wrist", "guard", "protection", "armor", "gauntlet", "glove",
            "covering",
        ],
    );
    insert(
        "rear-bracer",
        7,
        &[
            "bracer", "forearm", "wrist", "guard", "protection", "armor", "gauntlet", "glove",
            "covering",
        ],
    );
    insert(
        "eye-indifferent",
        9,
        &["eye", "eyes", "vision", "sight", "gaze", "neutral", "normal", "default", "standard"],
    );
    insert(
        "eye-surprised",
        9,
        &[
            "eye", "eyes", "vision", "sight", "gaze", "surprised", "shock", "amazed", "astonished",
            "wide",
        ],
    );
    insert(
        "mouth-grind",
        9,
        &["mouth", "lips", "teeth", "bite", "grind", "grit", "clench", "determined", "focused"],
    );
    insert(
        "mouth-oooo",
        9,
        &["mouth", "lips", "open", "oooo", "surprise", "gasp", "wow", "amazed", "round"],
    );
    insert(
        "mouth-smile",
        9,
        &["mouth", "lips", "smile", "grin", "happy", "cheerful", "joy", "pleased", "content"],
    );
    insert(
        "goggles",
        8,
        &["goggles", "glasses", "eyewear", "protection", "spectacles", "shades", "visor", "lens"],
    );
    insert(
        "gun",
        5,
        &[
            "gun", "weapon", "rifle", "pistol", "firearm", "blaster", "cannon", "launcher",
            "shooter",
        ],
    );
    insert(
        "crosshair",
        4,
        &["crosshair", "target", "aim", "sight", "reticle", "cursor", "pointer", "marker"],
    );
    insert(
        "hoverboard-board",
        4,
        &["hoverboard", "board", "platform", "skateboard", "surfboard", "deck", "ride"],
    );
    insert(
        "hoverboard-thruster",
        4,
        &["thruster", "engine", "propulsion", "jet", "booster", "rocket", "motor"],
    );

    for effect in ["hoverglow-small", "muzzle-glow", "muzzle-ring"] {
        insert(effect, 3, &[]);
    }
    for index in 1..=5 {
        insert(&format!("muzzle0{index}"), 3, &[]);
    }
    for effect in [
        "portal-bg",
        "portal-flare1",
        "portal-flare2",
        "portal-flare3",
        "portal-shade",
        "portal-streaks1",
        "portal-streaks2",
    ] {
        insert(effect, 2, &[]);
    }

    map
}
