// src/detection/types.rs

/// Raw detector output for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    /// In `[0, 1]`
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in frame pixel coordinates
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: [f32; 4]) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// What the controller cares about in a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectCategory {
    Vehicle,
    Person,
    Emergency,
}

impl ObjectCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vehicle => "vehicle",
            Self::Person => "person",
            Self::Emergency => "emergency",
        }
    }
}

/// A detection that passed the confidence filter and maps to a category.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedDetection {
    pub detection: Detection,
    pub category: ObjectCategory,
}
