use serde::{Deserialize, Serialize};

/// Decoding limits and switches.
///
/// Deserializes with defaults for every missing field, so it can be embedded in an
/// application's configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// How many leading bytes the sniffer looks at.
    pub sniff_window: usize,
    /// Keep initializer payloads. When false, tensors keep their type and shape only.
    pub load_tensor_data: bool,
    pub max_graph_depth: usize,
    pub max_tensor_rank: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options { sniff_window: 4096, load_tensor_data: true, max_graph_depth: 32, max_tensor_rank: 64 }
    }
}

impl Options {
    pub fn with_sniff_window(self, sniff_window: usize) -> Options {
        Options { sniff_window, ..self }
    }

    pub fn with_tensor_data(self, load_tensor_data: bool) -> Options {
        Options { load_tensor_data, ..self }
    }

    pub fn with_max_graph_depth(self, max_graph_depth: usize) -> Options {
        Options { max_graph_depth, ..self }
    }

    pub fn with_max_tensor_rank(self, max_tensor_rank: usize) -> Options {
        Options { max_tensor_rank, ..self }
    }
}
