use crate::error::ScanError;
use serde::Serialize;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

/// Named bundle of scan parameters: which ports, how fast, how wide.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanProfile {
    name: String,
    first_port: u16,
    last_port: u16,
    #[serde(with = "millis")]
    delay: Duration,
    max_concurrency: usize,
}

impl ScanProfile {
    /// Build a custom profile, checking bounds are within 1..=65535, ordered, and concurrency ≥ 1.
    pub fn new(
        name: impl Into<String>,
        ports: RangeInclusive<u16>,
        delay: Duration,
        max_concurrency: usize,
    ) -> Result<Self, ScanError> {
        let name = name.into();
        let (first_port, last_port) = (*ports.start(), *ports.end());
        let invalid = |reason: &str| ScanError::InvalidProfileSpec {
            name: name.clone(),
            reason: reason.to_string(),
        };
        if first_port == 0 {
            return Err(invalid("port 0 is out of range"));
        }
        if first_port > last_port {
            return Err(invalid("range start is greater than range end"));
        }
        if max_concurrency == 0 {
            return Err(invalid("max concurrency must be at least 1"));
        }
        Ok(Self {
            name,
            first_port,
            last_port,
            delay,
            max_concurrency,
        })
    }

    pub fn stealth() -> Self {
        Self::preset("Stealth", 10, 1023, 500, 10)
    }

    pub fn aggressive() -> Self {
        Self::preset("Aggressive", 1, 1024, 10, 100)
    }

    pub fn script() -> Self {
        Self::preset("Script", 20, 99, 200, 50)
    }

    /// All built-in presets, in menu order.
    pub fn presets() -> [ScanProfile; 3] {
        [Self::stealth(), Self::aggressive(), Self::script()]
    }

    fn preset(name: &str, first: u16, last: u16, delay_ms: u64, concurrency: usize) -> Self {
        Self {
            name: name.to_string(),
            first_port: first,
            last_port: last,
            delay: Duration::from_millis(delay_ms),
            max_concurrency: concurrency,
        }
    }

    /// Same profile with a different per-probe pacing delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ascending port sequence, inclusive of both bounds.
    pub fn ports(&self) -> RangeInclusive<u16> {
        self.first_port..=self.last_port
    }

    pub fn port_count(&self) -> usize {
        (self.last_port - self.first_port) as usize + 1
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

impl FromStr for ScanProfile {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::presets()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ScanError::InvalidProfile(s.to_string()))
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_known_modes() {
        let s = ScanProfile::stealth();
        assert_eq!(s.ports(), 10..=1023);
        assert_eq!(s.port_count(), 1014);
        assert_eq!(s.delay(), Duration::from_millis(500));
        assert_eq!(s.max_concurrency(), 10);

        let a = ScanProfile::aggressive();
        assert_eq!(a.ports(), 1..=1024);
        assert_eq!(a.max_concurrency(), 100);

        let sc = ScanProfile::script();
        assert_eq!(sc.ports(), 20..=99);
        assert_eq!(sc.port_count(), 80);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("stealth".parse::<ScanProfile>().unwrap(), ScanProfile::stealth());
        assert_eq!(" Aggressive ".parse::<ScanProfile>().unwrap().name(), "Aggressive");
        assert_eq!("SCRIPT".parse::<ScanProfile>().unwrap().name(), "Script");
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "badmode".parse::<ScanProfile>().unwrap_err();
        assert_eq!(err, ScanError::InvalidProfile("badmode".into()));
    }

    #[test]
    fn custom_profile_validation() {
        assert!(ScanProfile::new("x", 0..=10, Duration::ZERO, 1).is_err());
        assert!(ScanProfile::new("x", 20..=10, Duration::ZERO, 1).is_err());
        assert!(ScanProfile::new("x", 1..=10, Duration::ZERO, 0).is_err());
        let p = ScanProfile::new("x", 65535..=65535, Duration::ZERO, 1).unwrap();
        assert_eq!(p.port_count(), 1);
    }
}
