// src/detection/taxonomy.rs
//
// Fixed label taxonomy. Vehicle and person labels must match exactly (the
// detector emits lowercase COCO names); emergency labels are matched
// case-insensitively since custom models spell them inconsistently.

use super::types::{ClassifiedDetection, Detection, ObjectCategory};

const VEHICLE_LABELS: [&str; 5] = ["car", "truck", "bus", "motorbike", "bicycle"];
const PERSON_LABEL: &str = "person";
const EMERGENCY_LABELS: [&str; 3] = ["ambulance", "police car", "fire truck"];

/// Map a detector label to a category; unknown labels are ignored.
pub fn classify(label: &str) -> Option<ObjectCategory> {
    if EMERGENCY_LABELS
        .iter()
        .any(|e| label.eq_ignore_ascii_case(e))
    {
        Some(ObjectCategory::Emergency)
    } else if VEHICLE_LABELS.contains(&label) {
        Some(ObjectCategory::Vehicle)
    } else if label == PERSON_LABEL {
        Some(ObjectCategory::Person)
    } else {
        None
    }
}

/// Per-frame counts after confidence filtering and classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTally {
    pub vehicles: u32,
    pub persons: u32,
    pub emergencies: u32,
    /// Detections worth drawing, in detector order
    pub kept: Vec<ClassifiedDetection>,
}

impl FrameTally {
    pub fn emergency_detected(&self) -> bool {
        self.emergencies > 0
    }
}

/// Filter by `confidence_threshold` (inclusive) and count per category.
pub fn tally(detections: Vec<Detection>, confidence_threshold: f32) -> FrameTally {
    let mut out = FrameTally::default();

    for detection in detections {
        if detection.confidence < confidence_threshold {
            continue;
        }
        let Some(category) = classify(&detection.label) else {
            continue;
        };

        match category {
            ObjectCategory::Vehicle => out.vehicles += 1,
            ObjectCategory::Person => out.persons += 1,
            ObjectCategory::Emergency => out.emergencies += 1,
        }
        out.kept.push(ClassifiedDetection {
            detection,
            category,
        });
    }

    out
}
