//! Conversion results.

use crate::config::Strategy;
use serde::Serialize;

/// Result of a successful PDF → HTML conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// Sanitised HTML. Never empty.
    pub html: String,
    /// Number of pages in the source PDF.
    pub page_count: usize,
    /// Strategy that produced `html`, or `None` for text extraction.
    pub strategy: Option<Strategy>,
    pub stats: ConversionStats,
}

/// Timing and token accounting for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    /// Model requests made, including the tagging pass.
    pub inference_calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Time spent rasterising or extracting text.
    pub render_ms: u64,
    /// Time spent waiting on the model.
    pub inference_ms: u64,
    pub total_ms: u64,
}

impl ConversionStats {
    /// Fold one model answer's token counts into the totals.
    pub(crate) fn record_call(&mut self, input_tokens: u64, output_tokens: u64) {
        self.inference_calls += 1;
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_call_accumulates() {
        let mut stats = ConversionStats::default();
        stats.record_call(100, 10);
        stats.record_call(50, 5);
        assert_eq!(stats.inference_calls, 2);
        assert_eq!(stats.input_tokens, 150);
        assert_eq!(stats.output_tokens, 15);
    }
}
