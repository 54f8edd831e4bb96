use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Affine quantization parameters: `real = scale * (q - zero_point)`.
///
/// Per-tensor quantization has one scale and one zero point. Per-axis quantization has one of
/// each per slice along `axis`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantization {
    pub scale: Vec<f32>,
    pub zero_point: Vec<i64>,
    pub axis: Option<usize>,
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl Quantization {
    pub fn per_tensor(scale: f32, zero_point: i64) -> Quantization {
        Quantization { scale: vec![scale], zero_point: vec![zero_point], ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.scale.is_empty() && self.zero_point.is_empty() && self.min.is_empty() && self.max.is_empty()
    }

    /// Human readable formula lines, one per quantized channel.
    pub fn describe(&self) -> Vec<String> {
        if !self.scale.is_empty() || !self.zero_point.is_empty() {
            let len = self.scale.len().max(self.zero_point.len());
            (0..len)
                .map(|i| {
                    let scale = self.scale.get(i).copied().unwrap_or(1.0);
                    let zp = self.zero_point.get(i).copied().unwrap_or(0);
                    let q = match zp {
                        0 => "q".to_string(),
                        zp if zp > 0 => format!("(q - {zp})"),
                        zp => format!("(q + {})", -zp),
                    };
                    if scale == 1.0 { q } else { format!("{scale} * {q}") }
                })
                .collect()
        } else if !self.min.is_empty() || !self.max.is_empty() {
            self.min
                .iter()
                .map(Some)
                .pad_using(self.max.len(), |_| None)
                .zip(self.max.iter().map(Some).pad_using(self.min.len(), |_| None))
                .map(|(min, max)| {
                    let min = min.map(|m| m.to_string()).unwrap_or_else(|| "?".into());
                    let max = max.map(|m| m.to_string()).unwrap_or_else(|| "?".into());
                    format!("{min} \u{2264} q \u{2264} {max}")
                })
                .collect()
        } else {
            vec![]
        }
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.describe().join("; "))?;
        if let Some(axis) = self.axis {
            write!(f, " (axis {axis})")?;
        }
        Ok(())
    }
}
