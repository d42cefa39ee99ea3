use serde::Serialize;

/// Response policy accumulated by the gate. Fields are private so a stage
/// can only tighten: lifetime goes down, forced download turns on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    cache_lifetime_secs: u64,
    force_download: bool,
}

impl AccessDecision {
    pub fn new(cache_lifetime_secs: u64, force_download: bool) -> Self {
        Self { cache_lifetime_secs, force_download }
    }

    pub fn cache_lifetime_secs(&self) -> u64 { self.cache_lifetime_secs }
    pub fn force_download(&self) -> bool { self.force_download }

    pub fn with_lifetime_at_most(self, secs: u64) -> Self {
        Self { cache_lifetime_secs: self.cache_lifetime_secs.min(secs), ..self }
    }

    pub fn no_cache(self) -> Self { self.with_lifetime_at_most(0) }

    pub fn forcing_download(self) -> Self {
        Self { force_download: true, ..self }
    }
}
