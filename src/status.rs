use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 4] = [
        ProcessingStatus::Pending,
        ProcessingStatus::Processing,
        ProcessingStatus::Completed,
        ProcessingStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    pub fn from_column(value: &str) -> Self {
        Self::parse(value).unwrap_or(ProcessingStatus::Pending)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl LayerStatus {
    pub const ALL: [LayerStatus; 5] = [
        LayerStatus::Pending,
        LayerStatus::Processing,
        LayerStatus::Completed,
        LayerStatus::Failed,
        LayerStatus::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayerStatus::Pending => "pending",
            LayerStatus::Processing => "processing",
            LayerStatus::Completed => "completed",
            LayerStatus::Failed => "failed",
            LayerStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    pub fn from_column(value: &str) -> Self {
        Self::parse(value).unwrap_or(LayerStatus::Pending)
    }

    pub fn is_settled(self) -> bool {
        matches!(self, LayerStatus::Completed | LayerStatus::Skipped)
    }
}

impl fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GoldLayer {
    #[serde(rename = "gold_a")]
    Analytics,
    #[serde(rename = "gold_b")]
    Graph,
    #[serde(rename = "gold_c")]
    Vector,
}

impl GoldLayer {
    pub const ALL: [GoldLayer; 3] = [GoldLayer::Analytics, GoldLayer::Graph, GoldLayer::Vector];

    pub fn as_str(self) -> &'static str {
        match self {
            GoldLayer::Analytics => "gold_a",
            GoldLayer::Graph => "gold_b",
            GoldLayer::Vector => "gold_c",
        }
    }

    /// Accepts `gold_a`, `a`, or the destination name (`analytics`, `graph`, `vector`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gold_a" | "a" | "analytics" => Some(GoldLayer::Analytics),
            "gold_b" | "b" | "graph" => Some(GoldLayer::Graph),
            "gold_c" | "c" | "vector" => Some(GoldLayer::Vector),
            _ => None,
        }
    }

    pub fn destination(self) -> &'static str {
        match self {
            GoldLayer::Analytics => "analytics store",
            GoldLayer::Graph => "knowledge graph",
            GoldLayer::Vector => "vector index",
        }
    }
}

impl fmt::Display for GoldLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn parse_target_layers(values: &[String]) -> Vec<GoldLayer> {
    let mut layers: Vec<GoldLayer> = values
        .iter()
        .filter_map(|value| GoldLayer::parse(value))
        .collect();
    layers.sort();
    layers.dedup();
    layers
}
