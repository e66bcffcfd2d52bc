use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::ReferenceImage;
use crate::slots::{mentions, SlotCatalog};

const EXACT_MATCH_SCORE: u32 = 100;
const PARTIAL_MATCH_SCORE: u32 = 80;
const KEYWORD_SCORE: u32 = 20;
const FRONT_BONUS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredCandidate {
    /// Position in the original pool.
    pub index: usize,
    pub name: String,
    pub score: u32,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSelection {
    pub target_slot: String,
    /// User uploads in pool order, then at most one system image.
    pub references: Vec<ReferenceImage>,
    pub corrected: bool,
}

impl ReferenceSelection {
    pub fn body_part(&self) -> Option<&ReferenceImage> {
        self.references.iter().find(|image| image.is_system())
    }

    pub fn user_images(&self) -> impl Iterator<Item = &ReferenceImage> {
        self.references.iter().filter(|image| image.is_user())
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn summary(&self) -> Value {
        json!({
            "target_slot": self.target_slot,
            "body_part": self.body_part().map(|image| image.name.clone()),
            "user_images": self.user_images().count(),
            "references": self
                .references
                .iter()
                .map(ReferenceImage::summary)
                .collect::<Vec<Value>>(),
            "corrected": self.corrected,
        })
    }
}

/// Scores every system image in `pool` against `target_slot`, in pool order.
pub fn score_candidates(
    pool: &[ReferenceImage],
    prompt: &str,
    target_slot: &str,
    catalog: &SlotCatalog,
) -> Vec<ScoredCandidate> {
    let prompt = prompt.to_ascii_lowercase();
    let target = target_slot.trim().to_ascii_lowercase();

    pool.iter()
        .enumerate()
        .filter(|(_, image)| image.is_system())
        .map(|(index, image)| {
            let name = image.name.to_ascii_lowercase();
            let mut score = 0;
            let mut reasons = Vec::new();

            if !target.is_empty() && name == target {
                score += EXACT_MATCH_SCORE;
                reasons.push(format!("exact match with {target}"));
            }
            if !target.is_empty()
                && !name.is_empty()
                && (target.contains(&name) || name.contains(&target))
            {
                score += PARTIAL_MATCH_SCORE;
                reasons.push(format!("partial match with {target}"));
            }

            let matched: Vec<&str> = catalog
                .keywords(&name)
                .iter()
                .map(String::as_str)
                .filter(|keyword| mentions(&prompt, keyword))
                .collect();
            if !matched.is_empty() {
                score += KEYWORD_SCORE * matched.len() as u32;
                reasons.push(format!("keywords: {}", matched.join(", ")));
            }

            let base = catalog.base_priority(&name);
            if base > 0 {
                score += base;
                reasons.push(format!("base priority {base}"));
            }

            if name.contains("front") {
                score += FRONT_BONUS;
                reasons.push("front side".to_string());
            }

            ScoredCandidate {
                index,
                name: image.name.clone(),
                score,
                reasons,
            }
        })
        .collect()
}

/// All user uploads plus the single best-scoring system image, if any
/// scores above zero. Ties keep the earlier image in the pool.
pub fn select_references(
    pool: &[ReferenceImage],
    prompt: &str,
    target_slot: &str,
    catalog: &SlotCatalog,
) -> ReferenceSelection {
    let mut best: Option<ScoredCandidate> = None;
    for candidate in score_candidates(pool, prompt, target_slot, catalog) {
        debug!(
            name = %candidate.name,
            score = candidate.score,
            reasons = %candidate.reasons.join("; "),
            "scored reference candidate"
        );
        if candidate.score == 0 {
            continue;
        }
        if best
            .as_ref()
            .map_or(true, |current| candidate.score > current.score)
        {
            best = Some(candidate);
        }
    }

    let mut references: Vec<ReferenceImage> = pool
        .iter()
        .filter(|image| image.is_user())
        .cloned()
        .collect();
    if let Some(chosen) = best.as_ref().and_then(|candidate| pool.get(candidate.index)) {
        references.push(chosen.clone());
    }

    let (references, corrected) = enforce_single_body_part(references);
    ReferenceSelection {
        target_slot: target_slot.to_string(),
        references,
        corrected,
    }
}

/// Keeps every user upload and only the first system image.
///
/// Returns the trimmed list and whether anything had to be dropped.
pub fn enforce_single_body_part(references: Vec<ReferenceImage>) -> (Vec<ReferenceImage>, bool) {
    let system_count = references.iter().filter(|image| image.is_system()).count();
    if system_count <= 1 {
        return (references, false);
    }

    let mut kept_system = false;
    let mut dropped: Vec<String> = Vec::new();
    let mut kept = Vec::with_capacity(references.len() - system_count + 1);
    for image in references {
        if image.is_system() {
            if kept_system {
                dropped.push(image.name);
                continue;
            }
            kept_system = true;
        }
        kept.push(image);
    }
    warn!(
        dropped = %dropped.join(", "),
        "selection held more than one body-part image; kept the first"
    );
    (kept, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::references::InlinePayload;

    fn rig_pool() -> Vec<ReferenceImage> {
        let catalog = SlotCatalog::spineboy();
        catalog
            .manifest()
            .iter()
            .map(|file| {
                let name = file.trim_end_matches(".png");
                ReferenceImage::system(name, format!("/assets/spineboy/images/{file}"))
            })
            .collect()
    }

    fn upload(name: &str) -> ReferenceImage {
        ReferenceImage::user(name, 0, InlinePayload::new("image/png", "dGVzdA=="))
    }

    fn body_part_name(selection: &ReferenceSelection) -> Option<&str> {
        selection.body_part().map(|image| image.name.as_str())
    }

    #[test]
    fn selects_target_slot_image_and_all_uploads() {
        let catalog = SlotCatalog::spineboy();
        let mut pool = vec![upload("style-a.png")];
        pool.extend(rig_pool());
        pool.push(upload("style-b.png"));

        let selection = select_references(&pool, "give him a red hat", "head", &catalog);
        let names: Vec<&str> = selection
            .references
            .iter()
            .map(|image| image.name.as_str())
            .collect();
        assert_eq!(names, vec!["style-a", "style-b", "head"]);
        assert!(!selection.corrected);
    }

    #[test]
    fn original_example_prompts_pick_expected_parts() {
        let catalog = SlotCatalog::spineboy();
        let pool = vec![
            ReferenceImage::system("head", "/assets/head.png"),
            ReferenceImage::system("torso", "/assets/torso.png"),
            ReferenceImage::system("front-upper-arm", "/assets/arm.png"),
            ReferenceImage::system("front-foot", "/assets/foot.png"),
            upload("user-image.png"),
        ];
        let cases = [
            ("Give the character a red hat", "head", "head"),
            ("Make the character wear a blue jacket", "torso", "torso"),
            ("Give him stronger arms", "front-upper-arm", "front-upper-arm"),
            ("Make the character wear red boots", "front-foot", "front-foot"),
            ("Create a random item", "head", "head"),
        ];
        for (prompt, slot, expected) in cases {
            let selection = select_references(&pool, prompt, slot, &catalog);
            assert_eq!(body_part_name(&selection), Some(expected), "{prompt}");
            assert_eq!(selection.user_images().count(), 1);
        }
    }

    #[test]
    fn front_side_breaks_symmetric_ties() {
        let catalog = SlotCatalog::spineboy();
        let pool = rig_pool();
        let selection = select_references(&pool, "new boots", "rear-foot", &catalog);
        // Exact match on the requested side still wins over the front bonus.
        assert_eq!(body_part_name(&selection), Some("rear-foot"));

        let selection = select_references(&pool, "new boots", "foot", &catalog);
        assert_eq!(body_part_name(&selection), Some("front-foot"));
    }

    #[test]
    fn equal_scores_keep_pool_order() {
        let catalog = SlotCatalog::spineboy();
        let pool = vec![
            ReferenceImage::system("cape", "/assets/cape.png"),
            ReferenceImage::system("cape-alt", "/assets/cape-alt.png"),
        ];
        let selection = select_references(&pool, "a cape", "cape", &catalog);
        // cape: exact + partial; cape-alt: partial only.
        assert_eq!(body_part_name(&selection), Some("cape"));

        let pool = vec![
            ReferenceImage::system("wing-left", "/assets/wl.png"),
            ReferenceImage::system("wing-right", "/assets/wr.png"),
        ];
        let selection = select_references(&pool, "wings", "wing", &catalog);
        assert_eq!(body_part_name(&selection), Some("wing-left"));
    }

    #[test]
    fn unrelated_pool_selects_no_body_part() {
        let catalog = SlotCatalog::spineboy();
        let pool = vec![
            ReferenceImage::system("background", "/assets/bg.png"),
            upload("mood.png"),
        ];
        let selection = select_references(&pool, "a shiny hat", "head", &catalog);
        assert!(selection.body_part().is_none());
        assert_eq!(selection.references.len(), 1);
        assert!(selection.references[0].is_user());
    }

    #[test]
    fn empty_pool_yields_empty_selection() {
        let catalog = SlotCatalog::spineboy();
        let selection = select_references(&[], "anything", "head", &catalog);
        assert!(selection.is_empty());
        assert_eq!(selection.target_slot, "head");
    }

    #[test]
    fn selection_never_holds_two_system_images() {
        let catalog = SlotCatalog::spineboy();
        let mut pool = rig_pool();
        pool.insert(3, upload("a.png"));
        pool.push(upload("b.png"));
        let prompts = ["", "hat", "left boot and right arm", "gun goggles torso", "???"];
        let slots: Vec<String> = catalog.slots().map(|spec| spec.name.clone()).collect();
        for prompt in prompts {
            for slot in slots.iter().map(String::as_str).chain(["", "unknown"]) {
                let selection = select_references(&pool, prompt, slot, &catalog);
                let systems = selection
                    .references
                    .iter()
                    .filter(|image| image.is_system())
                    .count();
                assert!(systems <= 1, "{prompt} / {slot}");
                assert_eq!(selection.user_images().count(), 2);
            }
        }
    }

    #[test]
    fn enforce_keeps_first_system_image() {
        let references = vec![
            ReferenceImage::system("torso", "/t.png"),
            upload("style.png"),
            ReferenceImage::system("head", "/h.png"),
            ReferenceImage::system("gun", "/g.png"),
        ];
        let (kept, corrected) = enforce_single_body_part(references);
        assert!(corrected);
        let names: Vec<&str> = kept.iter().map(|image| image.name.as_str()).collect();
        assert_eq!(names, vec!["torso", "style"]);

        let (kept, corrected) = enforce_single_body_part(vec![upload("x.png")]);
        assert!(!corrected);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn candidate_reasons_explain_score() {
        let catalog = SlotCatalog::spineboy();
        let pool = vec![ReferenceImage::system("front-foot", "/f.png")];
        let scored = score_candidates(&pool, "red boots with a sole", "front-foot", &catalog);
        assert_eq!(scored.len(), 1);
        // 100 exact + 80 partial + 2 keywords (boot, sole) + 6 base + 5 front.
        assert_eq!(scored[0].score, 100 + 80 + 40 + 6 + 5);
        assert_eq!(scored[0].reasons.len(), 5);
    }
}
