//! Named time marks for a single request.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct Benchmark {
    marks: Vec<(String, Instant)>,
}

impl Benchmark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` now; a repeated name moves the mark.
    pub fn mark(&mut self, name: &str) {
        let now = Instant::now();
        match self.marks.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = now,
            None => self.marks.push((name.to_string(), now)),
        }
    }

    pub fn has_mark(&self, name: &str) -> bool {
        self.marks.iter().any(|(n, _)| n == name)
    }

    pub fn marks(&self) -> impl Iterator<Item = &str> {
        self.marks.iter().map(|(n, _)| n.as_str())
    }

    /// Time between two marks; `end` defaults to now.
    pub fn elapsed_time(&self, start: &str, end: Option<&str>) -> Option<Duration> {
        let find = |name: &str| self.marks.iter().find(|(n, _)| n == name).map(|(_, t)| *t);
        let start = find(start)?;
        let end = match end {
            Some(name) => find(name)?,
            None => Instant::now(),
        };
        Some(end.saturating_duration_since(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_and_elapsed() {
        let mut bench = Benchmark::new();
        bench.mark("start");
        bench.mark("end");
        assert!(bench.has_mark("start"));
        assert!(bench.elapsed_time("start", Some("end")).is_some());
        assert!(bench.elapsed_time("start", None).is_some());
        assert!(bench.elapsed_time("missing", None).is_none());

        bench.mark("start");
        assert_eq!(bench.marks().collect::<Vec<_>>(), ["start", "end"]);
    }
}
