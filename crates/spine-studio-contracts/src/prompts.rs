use crate::classification::Category;
use crate::references::ReferenceImage;
use crate::slots::mentions;

pub const REWRITE_PREFIX: &str = "Generate an image of";

pub const REWRITE_SYSTEM_PROMPT: &str = r#"You turn requests about a 2D game character into short image-generation prompts.

Reply with exactly one line of the form:
Generate an image of <item>

Keep the item, its color and any material or style words. Drop references to the character ("him", "the character", "give", "make").

Examples:
"give him a red hat" -> Generate an image of a red hat
"new shoes for him, something sporty" -> Generate an image of a pair of sporty shoes
"make his jacket look like leather" -> Generate an image of a leather jacket"#;

const COLORS: &[&str] = &[
    "red", "orange", "yellow", "green", "blue", "purple", "violet", "pink", "black", "white",
    "gray", "grey", "brown", "gold", "golden", "silver", "cyan", "magenta", "teal", "navy",
];

/// Substring fallbacks for when the rewrite call is unavailable, in match order.
const ITEM_FALLBACKS: &[(&[&str], &str)] = &[
    (&["hat"], "hat"),
    (&["helmet"], "helmet"),
    (&["crown"], "crown"),
    (&["goggles", "glasses"], "pair of goggles"),
    (&["boots", "boot"], "pair of boots"),
    (&["shoes", "shoe", "sneaker"], "pair of shoes"),
    (&["gloves", "glove"], "pair of gloves"),
    (&["jacket"], "jacket"),
    (&["shirt"], "shirt"),
    (&["armor", "armour"], "suit of armor"),
    (&["pants", "trousers"], "pair of pants"),
    (&["scarf"], "scarf"),
    (&["necklace"], "necklace"),
    (&["sword"], "sword"),
    (&["gun", "blaster", "rifle"], "gun"),
    (&["hoverboard"], "hoverboard"),
];

pub const ORIENTATION_CONTRACT: &str = "The character is drawn in side profile facing right (toward screen-right). The generated part must face right as well, drawn from the same side-on camera angle, so it can be attached to the rig without mirroring.";

const SPRITE_REQUIREMENTS: &[&str] = &[
    "Plain, solid, uniform background in a single flat color",
    "High contrast between the subject and the background, with crisp clean edges",
    "Subject centered in the frame with even padding on every side",
    "One isolated asset only: no character body, no text, no watermark, no cast shadow",
    "Flat 2D cartoon game-art style that matches a side-scrolling sprite rig",
];

pub fn detect_color(prompt: &str) -> Option<&'static str> {
    let lowered = prompt.to_ascii_lowercase();
    COLORS
        .iter()
        .copied()
        .find(|color| mentions(&lowered, color))
}

pub fn detect_item(prompt: &str) -> Option<&'static str> {
    let lowered = prompt.to_ascii_lowercase();
    ITEM_FALLBACKS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| mentions(&lowered, needle)))
        .map(|(_, item)| *item)
}

/// Deterministic stand-in for the rewrite call.
pub fn fallback_rewrite(original: &str) -> String {
    let Some(item) = detect_item(original) else {
        let text = original.trim().trim_end_matches('.');
        return format!("{REWRITE_PREFIX} {text}");
    };
    let phrase = match detect_color(original) {
        Some(color) => format!("{color} {item}"),
        None => item.to_string(),
    };
    format!("{REWRITE_PREFIX} {} {phrase}", article_for(&phrase))
}

/// Coerces a model reply into `Generate an image of <item>` form.
///
/// Returns `None` for replies with no usable text.
pub fn normalize_rewrite(reply: &str) -> Option<String> {
    let line = reply
        .lines()
        .map(|line| line.trim().trim_matches(|ch: char| ch == '"' || ch == '`' || ch == '\''))
        .find(|line| !line.is_empty() && !line.starts_with("```"))?;
    let line = line.trim().trim_end_matches('.').trim();
    if line.is_empty() {
        return None;
    }

    let prefix_len = REWRITE_PREFIX.len();
    let has_prefix = line
        .get(..prefix_len)
        .is_some_and(|head| head.eq_ignore_ascii_case(REWRITE_PREFIX));
    let item = if has_prefix {
        line[prefix_len..].trim()
    } else {
        line
    };
    if item.is_empty() {
        return None;
    }
    Some(format!("{REWRITE_PREFIX} {item}"))
}

fn article_for(phrase: &str) -> &'static str {
    match phrase.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

/// Everything `enhance` reads. No clock, no randomness.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhanceInput<'a> {
    pub short_prompt: &'a str,
    pub category: Category,
    pub item_type: Option<&'a str>,
    pub color: Option<&'a str>,
    pub target_slots: &'a [String],
    pub references: &'a [ReferenceImage],
    pub orientation_constraints: &'a [String],
}

pub fn enhance(input: &EnhanceInput<'_>) -> String {
    let mut sections: Vec<String> = Vec::new();

    let lead = input.short_prompt.trim().trim_end_matches('.');
    sections.push(format!("{lead}."));

    let mut requirements = String::from("Sprite asset requirements:");
    for line in SPRITE_REQUIREMENTS {
        requirements.push_str("\n- ");
        requirements.push_str(line);
    }
    sections.push(requirements);

    let item = input
        .item_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("as described in the request");
    let color = input
        .color
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("as described in the request");
    let mut subject = format!("Item: {item}\nColor: {color}");
    if !input.target_slots.is_empty() {
        subject.push_str(&format!(
            "\nAttaches to: {}",
            input.target_slots.join(", ")
        ));
    }
    if input.category != Category::ImageGeneration {
        subject.push_str(&format!("\nRequest type: {}", input.category));
    }
    sections.push(subject);

    let mut orientation = format!("Orientation:\n- {ORIENTATION_CONTRACT}");
    for constraint in input
        .orientation_constraints
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
    {
        orientation.push_str("\n- ");
        orientation.push_str(constraint);
    }
    sections.push(orientation);

    if !input.references.is_empty() {
        sections.push(reference_priority_block(input.references));
    }

    sections.join("\n\n")
}

fn reference_priority_block(references: &[ReferenceImage]) -> String {
    let body_part = references.iter().find(|image| image.is_system());
    let styles: Vec<&str> = references
        .iter()
        .filter(|image| image.is_user())
        .map(|image| image.name.as_str())
        .collect();

    let pose = match body_part {
        Some(image) => format!(
            "Match the pose, proportions and silhouette of the body-part reference \"{}\".",
            image.name
        ),
        None => {
            "No body-part reference is attached; keep proportions that fit the rig.".to_string()
        }
    };
    let style = if styles.is_empty() {
        "No style references are attached; keep the rig's existing art style.".to_string()
    } else {
        format!(
            "Apply the aesthetic style (palette, texture, line work) of the user references: {}.",
            styles.join(", ")
        )
    };

    [
        "Reference priority, apply in this order:".to_string(),
        "1. Match the orientation described above.".to_string(),
        format!("2. {pose}"),
        format!("3. {style}"),
        "4. Apply the requested content changes last, preserving everything established in steps 1-3."
            .to_string(),
    ]
    .join("\n")
}
