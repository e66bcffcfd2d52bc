use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{param_str, HandlerResult};
use crate::classification::{Category, ExtractedParams};
use crate::slots::mentions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationKind {
    Walk,
    Run,
    Jump,
    Dance,
    Idle,
    Other,
}

impl AnimationKind {
    pub const ALL: [AnimationKind; 6] = [
        AnimationKind::Walk,
        AnimationKind::Run,
        AnimationKind::Jump,
        AnimationKind::Dance,
        AnimationKind::Idle,
        AnimationKind::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::Run => "run",
            Self::Jump => "jump",
            Self::Dance => "dance",
            Self::Idle => "idle",
            Self::Other => "other",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        let label = label.strip_suffix("_animation").unwrap_or(&label);
        Self::ALL.into_iter().find(|kind| kind.as_str() == label)
    }

    /// First motion word found in the prompt, in `ALL` order.
    pub fn infer(prompt: &str) -> Self {
        let lowered = prompt.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .filter(|kind| *kind != Self::Other)
            .find(|kind| lowered.contains(kind.as_str()))
            .unwrap_or(Self::Other)
    }

    /// Seconds for one cycle at normal speed.
    pub fn base_duration(self) -> f64 {
        match self {
            Self::Walk => 1.0,
            Self::Run => 0.6,
            Self::Jump => 0.8,
            Self::Dance => 2.0,
            Self::Idle => 2.0,
            Self::Other => 1.0,
        }
    }

    pub fn bones(self) -> &'static [&'static str] {
        match self {
            Self::Walk => &["front-thigh", "front-shin", "rear-thigh", "rear-shin", "hip"],
            Self::Run => &[
                "torso",
                "front-upper-arm",
                "rear-upper-arm",
                "front-thigh",
                "rear-thigh",
                "front-shin",
                "rear-shin",
            ],
            Self::Jump => &["hip", "front-thigh", "rear-thigh", "front-shin", "rear-shin"],
            Self::Dance => &["hip", "torso", "head", "front-upper-arm", "rear-upper-arm"],
            Self::Idle => &["torso", "head"],
            Self::Other => &["torso"],
        }
    }

    pub fn loops(self) -> bool {
        !matches!(self, Self::Jump)
    }
}

impl fmt::Display for AnimationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedAdjustment {
    Faster,
    Slower,
    Normal,
}

impl SpeedAdjustment {
    pub fn parse(value: &str) -> Self {
        let lowered = value.trim().to_ascii_lowercase();
        let has = |words: &[&str]| words.iter().any(|word| mentions(&lowered, word));
        if has(&["faster", "fast", "quick", "speed up", "hurry", "rapid"]) {
            Self::Faster
        } else if has(&["slower", "slow", "sluggish", "lazy", "calm"]) {
            Self::Slower
        } else {
            Self::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Faster => "faster",
            Self::Slower => "slower",
            Self::Normal => "normal",
        }
    }

    pub fn duration_factor(self) -> f64 {
        match self {
            Self::Faster => 0.7,
            Self::Slower => 1.5,
            Self::Normal => 1.0,
        }
    }

    pub fn rate(self) -> f64 {
        match self {
            Self::Faster => 1.5,
            Self::Slower => 0.7,
            Self::Normal => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Keyframe {
    Rotate { time: f64, angle: f64 },
    Translate { time: f64, x: f64, y: f64 },
}

impl Keyframe {
    pub fn time(&self) -> f64 {
        match self {
            Self::Rotate { time, .. } | Self::Translate { time, .. } => *time,
        }
    }

    fn scaled(&self, duration: f64) -> Self {
        match *self {
            Self::Rotate { time, angle } => Self::Rotate {
                time: round_ms(time * duration),
                angle,
            },
            Self::Translate { time, x, y } => Self::Translate {
                time: round_ms(time * duration),
                x,
                y,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneTimeline {
    pub bone: String,
    pub keyframes: Vec<Keyframe>,
}

/// What the skeleton renderer needs to build one animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationPlan {
    pub name: String,
    pub kind: AnimationKind,
    pub base_duration: f64,
    pub duration: f64,
    pub speed: SpeedAdjustment,
    pub rate: f64,
    pub looping: bool,
    pub bones: Vec<String>,
    pub timelines: Vec<BoneTimeline>,
}

impl AnimationPlan {
    pub fn new(kind: AnimationKind, speed: SpeedAdjustment) -> Self {
        let base_duration = kind.base_duration();
        let duration = round_ms(base_duration * speed.duration_factor());
        let timelines = unit_timelines(kind)
            .into_iter()
            .map(|timeline| BoneTimeline {
                bone: timeline.bone,
                keyframes: timeline
                    .keyframes
                    .iter()
                    .map(|frame| frame.scaled(duration))
                    .collect(),
            })
            .collect();
        Self {
            name: kind.as_str().to_string(),
            kind,
            base_duration,
            duration,
            speed,
            rate: speed.rate(),
            looping: kind.loops(),
            bones: kind.bones().iter().map(|bone| (*bone).to_string()).collect(),
            timelines,
        }
    }

    /// Uses `animationType` and `speed` when present, else scans the prompt.
    pub fn from_request(prompt: &str, params: &ExtractedParams) -> Self {
        let kind = param_str(params, "animationType")
            .or_else(|| param_str(params, "type"))
            .and_then(AnimationKind::parse)
            .unwrap_or_else(|| AnimationKind::infer(prompt));
        let speed = match param_str(params, "speed").map(SpeedAdjustment::parse) {
            Some(speed) if speed != SpeedAdjustment::Normal => speed,
            _ => SpeedAdjustment::parse(prompt),
        };
        Self::new(kind, speed)
    }
}

pub fn handle_animation(prompt: &str, params: &ExtractedParams) -> HandlerResult {
    let plan = AnimationPlan::from_request(prompt, params);

    let mut out = Map::new();
    out.insert("animationName".to_string(), json!(plan.name));
    out.insert("animationType".to_string(), json!(plan.kind));
    out.insert("baseDuration".to_string(), json!(plan.base_duration));
    out.insert("duration".to_string(), json!(plan.duration));
    out.insert("speed".to_string(), json!(plan.speed));
    out.insert("speedMultiplier".to_string(), json!(plan.rate));
    out.insert("loop".to_string(), json!(plan.looping));
    out.insert("bones".to_string(), json!(plan.bones));
    if let Some(direction) = param_str(params, "direction") {
        out.insert("direction".to_string(), Value::String(direction.to_string()));
    }
    out.insert(
        "timelines".to_string(),
        serde_json::to_value(&plan.timelines).unwrap_or(Value::Null),
    );

    let message = format!(
        "Prepared {} animation: {:.3}s at {}x speed",
        plan.kind, plan.duration, plan.rate
    );
    HandlerResult::ok(Category::Animation, message, out)
}

fn round_ms(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

fn rotate(bone: &str, frames: &[(f64, f64)]) -> BoneTimeline {
    BoneTimeline {
        bone: bone.to_string(),
        keyframes: frames
            .iter()
            .map(|(time, angle)| Keyframe::Rotate {
                time: *time,
                angle: *angle,
            })
            .collect(),
    }
}

fn translate(bone: &str, frames: &[(f64, f64, f64)]) -> BoneTimeline {
    BoneTimeline {
        bone: bone.to_string(),
        keyframes: frames
            .iter()
            .map(|(time, x, y)| Keyframe::Translate {
                time: *time,
                x: *x,
                y: *y,
            })
            .collect(),
    }
}

/// Keyframes over a one-second cycle; the rear limbs run half a cycle behind.
fn unit_timelines(kind: AnimationKind) -> Vec<BoneTimeline> {
    match kind {
        AnimationKind::Walk => vec![
            rotate("front-thigh", &[(0.0, -30.0), (0.25, 30.0), (0.5, 30.0), (0.75, -30.0)]),
            rotate("front-shin", &[(0.0, -10.0), (0.25, 5.0), (0.5, 30.0), (0.75, -10.0)]),
            rotate("rear-thigh", &[(0.0, 30.0), (0.25, -30.0), (0.5, -30.0), (0.75, 30.0)]),
            rotate("rear-shin", &[(0.0, 30.0), (0.25, -10.0), (0.5, -10.0), (0.75, 5.0)]),
            translate("hip", &[(0.0, 0.0, 0.0), (0.5, 0.0, -10.0), (1.0, 0.0, 0.0)]),
        ],
        AnimationKind::Run => vec![
            rotate("torso", &[(0.0, -8.0), (0.5, -5.0), (1.0, -8.0)]),
            rotate("front-upper-arm", &[(0.0, 35.0), (0.5, -35.0), (1.0, 35.0)]),
            rotate("rear-upper-arm", &[(0.0, -35.0), (0.5, 35.0), (1.0, -35.0)]),
            rotate("front-thigh", &[(0.0, -45.0), (0.5, 45.0), (1.0, -45.0)]),
            rotate("rear-thigh", &[(0.0, 45.0), (0.5, -45.0), (1.0, 45.0)]),
            rotate("front-shin", &[(0.0, -20.0), (0.25, 40.0), (0.5, -20.0), (1.0, -20.0)]),
            rotate("rear-shin", &[(0.0, -20.0), (0.5, -20.0), (0.75, 40.0), (1.0, -20.0)]),
        ],
        AnimationKind::Jump => vec![
            translate(
                "hip",
                &[(0.0, 0.0, 0.0), (0.2, 0.0, -15.0), (0.5, 0.0, 60.0), (0.85, 0.0, 0.0)],
            ),
            rotate("front-thigh", &[(0.0, 0.0), (0.2, 35.0), (0.5, -20.0), (0.85, 0.0)]),
            rotate("rear-thigh", &[(0.0, 0.0), (0.2, 35.0), (0.5, -20.0), (0.85, 0.0)]),
            rotate("front-shin", &[(0.0, 0.0), (0.2, -50.0), (0.5, 30.0), (0.85, 0.0)]),
            rotate("rear-shin", &[(0.0, 0.0), (0.2, -50.0), (0.5, 30.0), (0.85, 0.0)]),
        ],
        AnimationKind::Dance => vec![
            translate(
                "hip",
                &[
                    (0.0, 0.0, 0.0),
                    (0.25, 6.0, -8.0),
                    (0.5, 0.0, 0.0),
                    (0.75, -6.0, -8.0),
                    (1.0, 0.0, 0.0),
                ],
            ),
            rotate("torso", &[(0.0, -10.0), (0.5, 10.0), (1.0, -10.0)]),
            rotate("head", &[(0.0, 8.0), (0.5, -8.0), (1.0, 8.0)]),
            rotate(
                "front-upper-arm",
                &[(0.0, 120.0), (0.25, 60.0), (0.5, 120.0), (0.75, 60.0), (1.0, 120.0)],
            ),
            rotate(
                "rear-upper-arm",
                &[(0.0, 60.0), (0.25, 120.0), (0.5, 60.0), (0.75, 120.0), (1.0, 60.0)],
            ),
        ],
        AnimationKind::Idle => vec![
            rotate("torso", &[(0.0, 0.0), (0.5, 2.0), (1.0, 0.0)]),
            rotate("head", &[(0.0, 0.0), (0.5, -2.0), (1.0, 0.0)]),
        ],
        AnimationKind::Other => vec![rotate("torso", &[(0.0, -5.0), (0.5, 5.0), (1.0, -5.0)])],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> ExtractedParams {
        value.as_object().cloned().unwrap_or_default()
    }

    fn close(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn run_faster_shortens_cycle() {
        let result = handle_animation(
            "make him run",
            &params(json!({"animationType": "run", "speed": "faster"})),
        );
        assert!(result.success);
        assert_eq!(result.category, Category::Animation);
        let out = &result.extracted_params;
        assert!(close(out["duration"].as_f64().unwrap_or(0.0), 0.42));
        assert!(close(out["speedMultiplier"].as_f64().unwrap_or(0.0), 1.5));
        let bones: Vec<&str> = out["bones"]
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        for bone in ["torso", "front-upper-arm", "rear-upper-arm"] {
            assert!(bones.contains(&bone), "missing {bone}");
        }
    }

    #[test]
    fn slower_lengthens_cycle() {
        let plan = AnimationPlan::from_request("dance slowly", &ExtractedParams::new());
        assert_eq!(plan.kind, AnimationKind::Dance);
        assert_eq!(plan.speed, SpeedAdjustment::Slower);
        assert!(close(plan.duration, 3.0));
        assert!(close(plan.rate, 0.7));
    }

    #[test]
    fn kind_comes_from_params_then_prompt() {
        let plan = AnimationPlan::from_request(
            "make him walk",
            &params(json!({"animationType": "jump_animation"})),
        );
        assert_eq!(plan.kind, AnimationKind::Jump);
        assert!(!plan.looping);

        let plan = AnimationPlan::from_request("he should be running", &ExtractedParams::new());
        assert_eq!(plan.kind, AnimationKind::Run);

        let plan = AnimationPlan::from_request("wave hello", &params(json!({"animationType": 7})));
        assert_eq!(plan.kind, AnimationKind::Other);
        assert!(close(plan.duration, 1.0));
        assert_eq!(plan.speed, SpeedAdjustment::Normal);
    }

    #[test]
    fn base_durations_per_kind() {
        let expected = [
            (AnimationKind::Walk, 1.0),
            (AnimationKind::Run, 0.6),
            (AnimationKind::Jump, 0.8),
            (AnimationKind::Dance, 2.0),
            (AnimationKind::Idle, 2.0),
            (AnimationKind::Other, 1.0),
        ];
        for (kind, seconds) in expected {
            assert!(close(AnimationPlan::new(kind, SpeedAdjustment::Normal).duration, seconds));
        }
    }

    #[test]
    fn timelines_fit_inside_the_cycle_and_touch_listed_bones() {
        for kind in AnimationKind::ALL {
            for speed in [
                SpeedAdjustment::Faster,
                SpeedAdjustment::Normal,
                SpeedAdjustment::Slower,
            ] {
                let plan = AnimationPlan::new(kind, speed);
                assert!(!plan.timelines.is_empty());
                for timeline in &plan.timelines {
                    assert!(plan.bones.contains(&timeline.bone), "{kind}: {}", timeline.bone);
                    let times: Vec<f64> = timeline.keyframes.iter().map(Keyframe::time).collect();
                    assert!(times.windows(2).all(|pair| pair[0] < pair[1]));
                    assert!(times.iter().all(|time| *time >= 0.0 && *time <= plan.duration + 1e-9));
                }
            }
        }
    }

    #[test]
    fn walk_timeline_matches_rig_cycle() {
        let plan = AnimationPlan::new(AnimationKind::Walk, SpeedAdjustment::Normal);
        let thigh = &plan.timelines[0];
        assert_eq!(thigh.bone, "front-thigh");
        assert_eq!(
            thigh.keyframes[1],
            Keyframe::Rotate {
                time: 0.25,
                angle: 30.0
            }
        );
        let encoded = serde_json::to_value(&thigh.keyframes[0]).unwrap_or(Value::Null);
        assert_eq!(encoded, json!({"type": "rotate", "time": 0.0, "angle": -30.0}));
    }

    #[test]
    fn direction_is_passed_through() {
        let result = handle_animation("walk", &params(json!({"direction": "left"})));
        assert_eq!(result.extracted_params["direction"], "left");
        assert_eq!(result.extracted_params["animationType"], "walk");
    }
}
