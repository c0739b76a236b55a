//! Resolution of event names into `perf_event_open` attributes.
//!
//! Event names arrive from the configuration as opaque strings. Three forms
//! are understood: the generic hardware event names, raw hex events
//! (`r01b7`), and `OFFCORE_RESPONSE_{0,1}` with colon-separated request,
//! supplier, and snoop qualifiers that are assembled into the off-core
//! response MSR value carried in `config1`.

/// Always-appended NUMA event: demand data reads missing LLC and served
/// from local DRAM.
pub const NUMA_LOCAL_EVENT: &str =
    "OFFCORE_RESPONSE_1:DMND_DATA_RD:LLC_MISS_LOCAL:SNP_MISS:SNP_NO_FWD";

/// Always-appended NUMA event: demand data reads missing LLC and served
/// from a remote node.
pub const NUMA_REMOTE_EVENT: &str =
    "OFFCORE_RESPONSE_0:DMND_DATA_RD:LLC_MISS_REMOTE:SNP_MISS:SNP_NO_FWD";

/// perf_event_attr type ids (perf_event.h).
const PERF_TYPE_HARDWARE: u32 = 0;
const PERF_TYPE_RAW: u32 = 4;

/// Event selects for the two off-core response counters, event 0xB7/0xBB
/// with umask 0x01.
const OFFCORE_RESPONSE_0_CONFIG: u64 = 0x01B7;
const OFFCORE_RESPONSE_1_CONFIG: u64 = 0x01BB;

/// A resolved event, ready to be installed into a `perf_event_attr`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSpec {
    /// The configured name, kept for diagnostics.
    pub name: String,
    pub type_id: u32,
    pub config: u64,
    pub config1: u64,
}

/// Error type for names that cannot be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveError {
    pub name: String,
    pub message: String,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot resolve event '{}': {}", self.name, self.message)
    }
}

impl std::error::Error for ResolveError {}

/// Generic hardware events, config values per perf_event.h.
fn hardware_config(name: &str) -> Option<u64> {
    let config = match name {
        "CPU_CYCLES" | "CYCLES" => 0,
        "INSTRUCTIONS" => 1,
        "CACHE_REFERENCES" => 2,
        "CACHE_MISSES" => 3,
        "BRANCH_INSTRUCTIONS" => 4,
        "BRANCH_MISSES" => 5,
        "BUS_CYCLES" => 6,
        "STALLED_CYCLES_FRONTEND" => 7,
        "STALLED_CYCLES_BACKEND" => 8,
        "REF_CPU_CYCLES" => 9,
        _ => return None,
    };
    Some(config)
}

/// Off-core response qualifier bits (request 0-15, supplier 16-30,
/// snoop 31-37).
fn offcore_bit(token: &str) -> Option<u64> {
    let bit = match token {
        "DMND_DATA_RD" => 1 << 0,
        "DMND_RFO" => 1 << 1,
        "DMND_IFETCH" => 1 << 2,
        "WB" => 1 << 3,
        "PF_DATA_RD" => 1 << 4,
        "PF_RFO" => 1 << 5,
        "PF_IFETCH" => 1 << 6,
        "PF_LLC_DATA_RD" => 1 << 7,
        "PF_LLC_RFO" => 1 << 8,
        "PF_LLC_IFETCH" => 1 << 9,
        "ANY_RESPONSE" => 1 << 16,
        "NO_SUPP" => 1 << 17,
        "LLC_HITM" => 1 << 18,
        "LLC_HITE" => 1 << 19,
        "LLC_HITS" => 1 << 20,
        "LLC_HITF" => 1 << 21,
        "LLC_MISS_LOCAL" => 1 << 26,
        // Remote misses cover the four remote-hop sources.
        "LLC_MISS_REMOTE" => 0b1111 << 27,
        "SNP_NONE" => 1 << 31,
        "SNP_NOT_NEEDED" => 1 << 32,
        "SNP_MISS" => 1 << 33,
        "SNP_NO_FWD" => 1 << 34,
        "SNP_FWD" => 1 << 35,
        "SNP_HITM" => 1 << 36,
        "NON_DRAM" => 1 << 37,
        _ => return None,
    };
    Some(bit)
}

/// Resolves a configured event name.
pub fn resolve(name: &str) -> Result<EventSpec, ResolveError> {
    let error = |message: &str| ResolveError {
        name: name.to_string(),
        message: message.to_string(),
    };

    // Raw hex events: rNNNN.
    if let Some(hex) = name.strip_prefix('r')
        && !hex.is_empty()
        && let Ok(config) = u64::from_str_radix(hex, 16)
    {
        return Ok(EventSpec {
            name: name.to_string(),
            type_id: PERF_TYPE_RAW,
            config,
            config1: 0,
        });
    }

    // Off-core response events with qualifiers.
    if let Some(rest) = name
        .strip_prefix("OFFCORE_RESPONSE_0")
        .map(|rest| (OFFCORE_RESPONSE_0_CONFIG, rest))
        .or_else(|| {
            name.strip_prefix("OFFCORE_RESPONSE_1")
                .map(|rest| (OFFCORE_RESPONSE_1_CONFIG, rest))
        })
    {
        let (config, qualifiers) = rest;
        let mut config1 = 0u64;
        for token in qualifiers.split(':').filter(|t| !t.is_empty()) {
            config1 |= offcore_bit(token).ok_or_else(|| error("unknown off-core qualifier"))?;
        }
        if config1 == 0 {
            return Err(error("off-core event needs at least one qualifier"));
        }
        return Ok(EventSpec {
            name: name.to_string(),
            type_id: PERF_TYPE_RAW,
            config,
            config1,
        });
    }

    if let Some(config) = hardware_config(name) {
        return Ok(EventSpec {
            name: name.to_string(),
            type_id: PERF_TYPE_HARDWARE,
            config,
            config1: 0,
        });
    }

    Err(error("unknown event name"))
}
