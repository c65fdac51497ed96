use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for per-session pipeline events.
///
/// One logger belongs to one session; the pipeline reports into it and
/// the host decides where the numbers end up.
pub trait PipelineLogger: Send {
    /// Report that a frame finished processing.
    fn frame_processed(&mut self, frame_index: u64);

    /// Record how long a named pipeline stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. region count, dropped frames).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn frame_processed(&mut self, _frame_index: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running count, sum and maximum of one timing or metric.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageStats {
    pub count: u64,
    pub sum: f64,
    pub max: f64,
}

impl StageStats {
    fn record(&mut self, value: f64) {
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Logger that aggregates per-stage timings and metrics and reports a
/// summary through the `log` facade when the session closes.
///
/// Only running aggregates are kept, so memory stays flat over
/// arbitrarily long sessions. Individual frame timings go out at `trace`
/// level.
pub struct LogPipelineLogger {
    session: String,
    timings: HashMap<String, StageStats>,
    metrics: HashMap<String, StageStats>,
    start_time: Instant,
    frames: u64,
}

impl LogPipelineLogger {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames;
        let mut lines = Vec::new();

        lines.push(format!(
            "Session {} summary ({frames} frames, {:.1}s connected):",
            self.session,
            elapsed_ms / 1000.0
        ));

        let mut stages: Vec<_> = self.timings.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, stats) in stages {
            lines.push(format!(
                "  {stage:12}: avg {:6.1}ms  max {:6.1}ms  total {:7.0}ms",
                stats.mean(),
                stats.max,
                stats.sum
            ));
        }

        let mut metrics: Vec<_> = self.metrics.iter().collect();
        metrics.sort_by(|a, b| a.0.cmp(b.0));
        for (name, stats) in metrics {
            lines.push(format!("  {name}: avg {:.1}  sum {:.0}", stats.mean(), stats.sum));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    /// Returns the aggregated timings for a given stage.
    pub fn timings_for(&self, stage: &str) -> Option<&StageStats> {
        self.timings.get(stage)
    }

    /// Returns the aggregated values for a given metric.
    pub fn metrics_for(&self, name: &str) -> Option<&StageStats> {
        self.metrics.get(name)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn frame_processed(&mut self, frame_index: u64) {
        self.frames += 1;
        log::trace!("[{}] frame {frame_index} done", self.session);
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        log::trace!("[{}] {stage}: {duration_ms:.1}ms", self.session);
        self.timings
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("[{}] {message}", self.session);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullPipelineLogger;
        logger.frame_processed(1);
        logger.timing("detect", 5.0);
        logger.metric("detections", 3.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = LogPipelineLogger::new("s1");
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("identify", 5.0);

        let detect = logger.timings_for("detect").unwrap();
        assert_eq!(detect.count, 2);
        assert_abs_diff_eq!(detect.sum, 50.0);
        assert_abs_diff_eq!(detect.max, 30.0);
        assert_eq!(logger.timings_for("identify").unwrap().count, 1);
        assert!(logger.timings_for("decode").is_none());
    }

    #[test]
    fn test_metric_records_values() {
        let mut logger = LogPipelineLogger::new("s1");
        logger.metric("detections", 3.0);
        logger.metric("detections", 4.0);

        let values = logger.metrics_for("detections").unwrap();
        assert_abs_diff_eq!(values.mean(), 3.5);
    }

    #[test]
    fn test_long_session_keeps_only_aggregates() {
        let mut logger = LogPipelineLogger::new("long");
        for i in 0..10_000u64 {
            logger.frame_processed(i);
            logger.timing("detect", (i % 10) as f64);
            logger.metric("detections", 2.0);
        }

        let detect = logger.timings_for("detect").unwrap();
        assert_eq!(detect.count, 10_000);
        assert_abs_diff_eq!(detect.max, 9.0);
        assert_abs_diff_eq!(detect.mean(), 4.5);
        assert_eq!(logger.timings.len(), 1);
        assert_eq!(logger.metrics.len(), 1);
    }

    #[test]
    fn test_max_tracks_negative_values() {
        let mut stats = StageStats::default();
        stats.record(-3.0);
        stats.record(-1.0);
        assert_abs_diff_eq!(stats.max, -1.0);
        assert_abs_diff_eq!(StageStats::default().mean(), 0.0);
    }

    #[test]
    fn test_frames_are_counted() {
        let mut logger = LogPipelineLogger::new("s1");
        logger.frame_processed(1);
        logger.frame_processed(2);
        assert_eq!(logger.frames(), 2);
    }

    #[test]
    fn test_summary_includes_stages_and_metrics() {
        let mut logger = LogPipelineLogger::new("abc");
        logger.frame_processed(1);
        logger.timing("detect", 20.0);
        logger.timing("identify", 5.0);
        logger.metric("detections", 3.0);
        logger.metric("detections", 4.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Session abc summary"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("identify"));
        assert!(summary.contains("avg 3.5"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        let logger = LogPipelineLogger::new("s1");
        assert!(logger.summary_string().is_none());
    }
}
