/// Stopping and pacing parameters of a user session.
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// When a session stops issuing requests. Whichever limit is hit first wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopCondition {
    /// Wall-clock budget measured from session start.
    pub duration: Option<Duration>,
    /// Per-session message limit.
    pub max_messages: Option<u64>,
    /// Count failed attempts toward `max_messages` too.
    pub count_failures: bool,
}

impl StopCondition {
    pub fn for_duration(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            max_messages: None,
            count_failures: false,
        }
    }

    pub fn is_met(&self, started: Instant, completed: u64, attempts: u64) -> bool {
        if let Some(duration) = self.duration {
            if started.elapsed() >= duration {
                return true;
            }
        }
        if let Some(max) = self.max_messages {
            let counted = if self.count_failures { attempts } else { completed };
            if counted >= max {
                return true;
            }
        }
        false
    }
}

/// Inclusive range a random pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Result<Self, String> {
        if min > max {
            return Err(format!(
                "Delay minimum ({:?}) exceeds maximum ({:?})",
                min, max
            ));
        }
        Ok(Self { min, max })
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// Draw a pause uniformly from the range, at millisecond resolution.
    pub fn sample(&self, rng: &mut fastrand::Rng) -> Duration {
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        if min_ms >= max_ms {
            self.min
        } else {
            Duration::from_millis(rng.u64(min_ms..=max_ms))
        }
    }
}

impl FromStr for DelayRange {
    type Err = String;

    /// Accepts `"500ms"`, `"3s"`, `"3-8s"`, `"250-750ms"`; bare numbers are seconds.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("Delay cannot be empty".to_string());
        }

        let (body, millis) = if let Some(body) = trimmed.strip_suffix("ms") {
            (body, true)
        } else if let Some(body) = trimmed.strip_suffix('s') {
            (body, false)
        } else {
            (trimmed, false)
        };

        let parse = |value: &str| -> Result<Duration, String> {
            let number: f64 = value
                .trim()
                .parse()
                .map_err(|_| format!("Invalid delay value '{}' in '{}'", value.trim(), input))?;
            if !number.is_finite() || number < 0.0 {
                return Err(format!("Delay must be a non-negative number: '{}'", input));
            }
            let micros = if millis { number * 1e3 } else { number * 1e6 };
            Ok(Duration::from_micros(micros.round() as u64))
        };

        match body.split_once('-') {
            Some((min, max)) => DelayRange::new(parse(min)?, parse(max)?),
            None => Ok(DelayRange::fixed(parse(body)?)),
        }
    }
}

/// Pauses between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Pause after every attempt that reached the server.
    pub delay: DelayRange,
    /// Pause after a transport failure; never shorter than the regular pause.
    pub error_backoff: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            delay: DelayRange::fixed(Duration::ZERO),
            error_backoff: Duration::ZERO,
        }
    }

    pub fn regular(&self, rng: &mut fastrand::Rng) -> Duration {
        self.delay.sample(rng)
    }

    pub fn after_error(&self, rng: &mut fastrand::Rng) -> Duration {
        self.error_backoff.max(self.delay.sample(rng))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            delay: DelayRange {
                min: Duration::from_secs(3),
                max: Duration::from_secs(8),
            },
            error_backoff: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_and_units() {
        let range: DelayRange = "3-8s".parse().unwrap();
        assert_eq!(range.min, Duration::from_secs(3));
        assert_eq!(range.max, Duration::from_secs(8));

        let range: DelayRange = "250-750ms".parse().unwrap();
        assert_eq!(range.min, Duration::from_millis(250));
        assert_eq!(range.max, Duration::from_millis(750));

        let range: DelayRange = "500ms".parse().unwrap();
        assert_eq!(range, DelayRange::fixed(Duration::from_millis(500)));

        let range: DelayRange = "2".parse().unwrap();
        assert_eq!(range, DelayRange::fixed(Duration::from_secs(2)));

        let range: DelayRange = "0.5s".parse().unwrap();
        assert_eq!(range, DelayRange::fixed(Duration::from_millis(500)));
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!("".parse::<DelayRange>().is_err());
        assert!("8-3s".parse::<DelayRange>().is_err());
        assert!("fast".parse::<DelayRange>().is_err());
        assert!("-1s".parse::<DelayRange>().is_err());
    }

    #[test]
    fn samples_stay_within_range() {
        let range = DelayRange::new(Duration::from_millis(10), Duration::from_millis(20)).unwrap();
        let mut rng = fastrand::Rng::with_seed(1);
        for _ in 0..200 {
            let d = range.sample(&mut rng);
            assert!(d >= range.min && d <= range.max);
        }
    }

    #[test]
    fn error_backoff_is_never_shorter_than_regular_pause() {
        let pacing = Pacing {
            delay: DelayRange::fixed(Duration::from_secs(8)),
            error_backoff: Duration::from_secs(5),
        };
        let mut rng = fastrand::Rng::with_seed(3);
        assert_eq!(pacing.after_error(&mut rng), Duration::from_secs(8));

        let pacing = Pacing::default();
        for _ in 0..50 {
            assert!(pacing.after_error(&mut rng) >= Duration::from_secs(5));
        }
    }

    #[test]
    fn stop_condition_counts_completed_by_default() {
        let stop = StopCondition {
            duration: None,
            max_messages: Some(3),
            count_failures: false,
        };
        let started = Instant::now();
        assert!(!stop.is_met(started, 2, 10));
        assert!(stop.is_met(started, 3, 3));

        let stop = StopCondition {
            count_failures: true,
            ..stop
        };
        assert!(stop.is_met(started, 0, 3));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_condition_follows_the_runtime_clock() {
        let stop = StopCondition::for_duration(Duration::from_secs(60));
        let started = Instant::now();
        assert!(!stop.is_met(started, 0, 0));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!stop.is_met(started, 0, 0));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(stop.is_met(started, 0, 0));
    }

    #[test]
    fn stop_condition_duration_expiry() {
        let stop = StopCondition::for_duration(Duration::ZERO);
        assert!(stop.is_met(Instant::now(), 0, 0));

        let stop = StopCondition::for_duration(Duration::from_secs(3600));
        assert!(!stop.is_met(Instant::now(), 1_000, 1_000));
    }
}
