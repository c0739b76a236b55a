//! Parsers for the `/proc` files the engine consumes.
//!
//! These are pure functions over file contents so they can be tested with
//! string fixtures. I/O and skip-on-vanish policy live in the collectors.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// The subset of `/proc/<pid>/stat` the engine uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PidStat {
    pub state: char,
    pub minflt: u64,
    pub cminflt: u64,
    pub majflt: u64,
    pub cmajflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub cutime: u64,
    pub cstime: u64,
    /// Virtual memory size in bytes.
    pub vsize: u64,
    /// Resident set size in pages.
    pub rss: u64,
}

/// Splits a `/proc/.../stat` line into the fields after the comm token.
///
/// The comm field is enclosed in parentheses and may itself contain spaces
/// and parentheses, so the split anchors on the last `)` in the line.
fn stat_fields(content: &str) -> Result<Vec<&str>, ParseError> {
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;
    Ok(content[close_paren + 1..].split_whitespace().collect())
}

fn stat_field_u64(fields: &[&str], idx: usize, name: &str) -> Result<u64, ParseError> {
    fields
        .get(idx)
        .ok_or_else(|| ParseError::new(format!("missing field {name}")))?
        .parse()
        .map_err(|_| ParseError::new(format!("invalid {name}")))
}

fn stat_field_i64(fields: &[&str], idx: usize, name: &str) -> Result<i64, ParseError> {
    fields
        .get(idx)
        .ok_or_else(|| ParseError::new(format!("missing field {name}")))?
        .parse()
        .map_err(|_| ParseError::new(format!("invalid {name}")))
}

/// Parses `/proc/<pid>/stat`.
///
/// Field numbers follow proc(5): state is field 3, the fault counters are
/// fields 10-13, the CPU times fields 14-17, vsize field 23, rss field 24.
pub fn parse_pid_stat(content: &str) -> Result<PidStat, ParseError> {
    let fields = stat_fields(content)?;

    if fields.len() < 22 {
        return Err(ParseError::new(format!(
            "short stat line: {} fields after comm",
            fields.len()
        )));
    }

    Ok(PidStat {
        state: fields[0].chars().next().unwrap_or('?'),
        minflt: stat_field_u64(&fields, 7, "minflt")?,
        cminflt: stat_field_u64(&fields, 8, "cminflt")?,
        majflt: stat_field_u64(&fields, 9, "majflt")?,
        cmajflt: stat_field_u64(&fields, 10, "cmajflt")?,
        utime: stat_field_u64(&fields, 11, "utime")?,
        stime: stat_field_u64(&fields, 12, "stime")?,
        cutime: stat_field_i64(&fields, 13, "cutime")?.max(0) as u64,
        cstime: stat_field_i64(&fields, 14, "cstime")?.max(0) as u64,
        vsize: stat_field_u64(&fields, 20, "vsize")?,
        rss: stat_field_i64(&fields, 21, "rss")?.max(0) as u64,
    })
}

/// Extracts the last-run CPU (field 39) from `/proc/<pid>/task/<tid>/stat`.
pub fn parse_task_last_cpu(content: &str) -> Result<u32, ParseError> {
    let fields = stat_fields(content)?;
    stat_field_u64(&fields, 36, "processor").map(|cpu| cpu as u32)
}

/// Extracts the context-switch counters from `/proc/<pid>/status`.
///
/// Keyed lookup rather than positional, so kernels that insert fields
/// earlier in the file do not shift the result.
pub fn parse_ctxt_switches(content: &str) -> Result<(u64, u64), ParseError> {
    let mut voluntary = None;
    let mut nonvoluntary = None;

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let slot = match key.trim() {
                "voluntary_ctxt_switches" => &mut voluntary,
                "nonvoluntary_ctxt_switches" => &mut nonvoluntary,
                _ => continue,
            };
            *slot = value.trim().parse::<u64>().ok();
        }
    }

    match (voluntary, nonvoluntary) {
        (Some(v), Some(nv)) => Ok((v, nv)),
        _ => Err(ParseError::new("status missing ctxt_switches lines")),
    }
}

/// Extracts `read_bytes` and `write_bytes` from `/proc/<pid>/io`.
/// `cancelled_write_bytes` is deliberately ignored.
pub fn parse_io_bytes(content: &str) -> Result<(u64, u64), ParseError> {
    let mut read_bytes = None;
    let mut write_bytes = None;

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let slot = match key.trim() {
                "read_bytes" => &mut read_bytes,
                "write_bytes" => &mut write_bytes,
                _ => continue,
            };
            *slot = value.trim().parse::<u64>().ok();
        }
    }

    match (read_bytes, write_bytes) {
        (Some(r), Some(w)) => Ok((r, w)),
        _ => Err(ParseError::new("io missing read/write_bytes lines")),
    }
}

/// Sums the first seven jiffy fields of the aggregate `cpu` line of
/// `/proc/stat` (user, nice, system, idle, iowait, irq, softirq).
pub fn parse_cpu_total(content: &str) -> Result<u64, ParseError> {
    let first = content
        .lines()
        .next()
        .ok_or_else(|| ParseError::new("empty /proc/stat"))?;
    let mut tokens = first.split_whitespace();

    if tokens.next() != Some("cpu") {
        return Err(ParseError::new("first line of /proc/stat is not 'cpu'"));
    }

    let mut sum = 0u64;
    for i in 0..7 {
        let token = tokens
            .next()
            .ok_or_else(|| ParseError::new(format!("cpu line has only {i} jiffy fields")))?;
        let value: u64 = token
            .parse()
            .map_err(|_| ParseError::new(format!("invalid jiffy field '{token}'")))?;
        sum += value;
    }
    Ok(sum)
}

/// Per-core interrupt counts accumulated over the NIC-bound lines of
/// `/proc/interrupts`.
///
/// A data line starts with a numeric IRQ token (`24:`), carries one count
/// per core, and ends with identifier columns; only lines whose final
/// column begins with `eth` contribute. The header line and the named rows
/// (`NMI:`, `ERR:`, ...) are skipped.
pub fn parse_nic_interrupts(content: &str, num_cores: usize) -> Result<Vec<i64>, ParseError> {
    let mut totals = vec![0i64; num_cores];

    for line in content.lines().skip(1) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < num_cores + 2 {
            continue;
        }

        let Some(irq) = tokens[0].strip_suffix(':') else {
            continue;
        };
        if irq.parse::<u32>().is_err() {
            continue;
        }

        if !tokens.last().is_some_and(|id| id.starts_with("eth")) {
            continue;
        }

        for (core, token) in tokens[1..1 + num_cores].iter().enumerate() {
            let count: i64 = token
                .parse()
                .map_err(|_| ParseError::new(format!("invalid interrupt count '{token}'")))?;
            totals[core] += count;
        }
    }

    Ok(totals)
}

/// Number of counters in a network totals array: recv and send bytes,
/// packets, errors, and drops.
pub const NET_COUNTERS: usize = 8;

/// Sums the receive/transmit counters of every `eth*` interface in
/// `/proc/net/dev`.
///
/// Layout per counter: recv bytes, packets, errs, drops, then send bytes,
/// packets, errs, drops.
pub fn parse_nic_totals(content: &str) -> Result<[u64; NET_COUNTERS], ParseError> {
    let mut totals = [0u64; NET_COUNTERS];

    // Two header lines, both containing '|'.
    for line in content.lines() {
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }

        let Some((iface, rest)) = line.split_once(':') else {
            continue;
        };
        if !iface.trim().starts_with("eth") {
            continue;
        }

        let values: Vec<&str> = rest.split_whitespace().collect();
        if values.len() < 16 {
            return Err(ParseError::new(format!(
                "short /proc/net/dev line for {}",
                iface.trim()
            )));
        }

        let parse = |idx: usize| -> Result<u64, ParseError> {
            values[idx]
                .parse()
                .map_err(|_| ParseError::new(format!("invalid net counter '{}'", values[idx])))
        };

        // Receive: bytes packets errs drop; transmit starts at column 8.
        for (slot, idx) in [0, 1, 2, 3, 8, 9, 10, 11].iter().enumerate() {
            totals[slot] += parse(*idx)?;
        }
    }

    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_BASH: &str = "1234 (bash) S 1233 1234 1234 34816 1235 4194304 5000 50000 10 20 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 5 0 0 0 0 0 0 0 0 0 0";

    #[test]
    fn pid_stat_basic() {
        let stat = parse_pid_stat(STAT_BASH).unwrap();

        assert_eq!(stat.state, 'S');
        assert_eq!(stat.minflt, 5000);
        assert_eq!(stat.cminflt, 50000);
        assert_eq!(stat.majflt, 10);
        assert_eq!(stat.cmajflt, 20);
        assert_eq!(stat.utime, 100);
        assert_eq!(stat.stime, 50);
        assert_eq!(stat.cutime, 200);
        assert_eq!(stat.cstime, 100);
        assert_eq!(stat.vsize, 25000000);
        assert_eq!(stat.rss, 2000);
    }

    #[test]
    fn pid_stat_comm_with_spaces_and_parens() {
        let content = "5000 (Web (Content) 2) R 4999 5000 4999 0 -1 4194304 100000 0 500 0 5000 1000 0 0 20 0 20 0 500000 2000000000 50000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_pid_stat(content).unwrap();

        assert_eq!(stat.state, 'R');
        assert_eq!(stat.minflt, 100000);
        assert_eq!(stat.utime, 5000);
    }

    #[test]
    fn pid_stat_zombie_state() {
        let content = "4000 (defunct) Z 1000 4000 1000 0 -1 4194308 0 0 0 0 0 0 0 0 20 0 1 0 400000 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_pid_stat(content).unwrap();
        assert_eq!(stat.state, 'Z');
    }

    #[test]
    fn pid_stat_short_line_is_error() {
        assert!(parse_pid_stat("77 (x) S 1 2 3").is_err());
        assert!(parse_pid_stat("no parens here").is_err());
    }

    #[test]
    fn task_last_cpu() {
        assert_eq!(parse_task_last_cpu(STAT_BASH).unwrap(), 2);
    }

    #[test]
    fn ctxt_switches_keyed() {
        let content = "\
Name:\tbash
Pid:\t1234
VmRSS:\t    8000 kB
voluntary_ctxt_switches:\t500
nonvoluntary_ctxt_switches:\t50
";
        assert_eq!(parse_ctxt_switches(content).unwrap(), (500, 50));
    }

    #[test]
    fn ctxt_switches_missing_is_error() {
        assert!(parse_ctxt_switches("Name:\tbash\n").is_err());
    }

    #[test]
    fn io_bytes_ignores_cancelled() {
        let content = "\
rchar: 1000000
wchar: 500000
syscr: 5000
syscw: 2500
read_bytes: 100000
write_bytes: 50000
cancelled_write_bytes: 1000
";
        assert_eq!(parse_io_bytes(content).unwrap(), (100000, 50000));
    }

    #[test]
    fn cpu_total_sums_seven_fields() {
        let content = "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
";
        // steal/guest/guest_nice (the trailing 0 0 0) are excluded.
        assert_eq!(parse_cpu_total(content).unwrap(), 94800);
    }

    #[test]
    fn cpu_total_short_line_is_error() {
        assert!(parse_cpu_total("cpu 1 2 3\n").is_err());
        assert!(parse_cpu_total("intr 1 2 3 4 5 6 7\n").is_err());
    }

    #[test]
    fn nic_interrupts_eth_row() {
        let content = "\
           CPU0       CPU1       CPU2       CPU3
  24:        100        200        300        400   PCI-MSI  eth0
";
        let totals = parse_nic_interrupts(content, 4).unwrap();
        assert_eq!(totals, vec![100, 200, 300, 400]);
    }

    #[test]
    fn nic_interrupts_ignores_other_interfaces_and_named_rows() {
        let content = "\
           CPU0       CPU1       CPU2       CPU3
  25:          1          2          3          4   PCI-MSI  enp3s0
 NMI:          9          9          9          9   Non-maskable interrupts
  26:         10         20         30         40   PCI-MSI  eth1
";
        let totals = parse_nic_interrupts(content, 4).unwrap();
        assert_eq!(totals, vec![10, 20, 30, 40]);
    }

    #[test]
    fn nic_totals_sums_eth_only() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
  eth0: 9876543     5678    1    2    0     0          0        10 87654321     4321    3    4    0     0       0          0
  eth1:     100       10    0    1    0     0          0         0      200       20    1    0    0     0       0          0
";
        let totals = parse_nic_totals(content).unwrap();
        assert_eq!(
            totals,
            [9876643, 5688, 1, 3, 87654521, 4341, 4, 4]
        );
    }
}
