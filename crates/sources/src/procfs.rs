//! Readers for the parts of `/proc` sysinfo does not expose
//!
//! Parsing is split from file access so the parsers can be checked against
//! literal fixtures; [`Procfs`] only knows where the files live.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use rg_probe_core::CpuTicks;
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Kernel clock ticks per second (`USER_HZ`) as reported by the C library
static CLOCK_TICKS_PER_SEC: Lazy<u64> = Lazy::new(|| {
    // SAFETY: `sysconf` is thread-safe for this query and has no side effects.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz > 0 {
        hz as u64
    } else {
        log::warn!("sysconf(_SC_CLK_TCK) failed, assuming 100 ticks per second");
        100
    }
});

pub fn clock_ticks_per_sec() -> u64 {
    *CLOCK_TICKS_PER_SEC
}

/// CPU details from `/proc/cpuinfo`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuInfo {
    pub model_name: String,
    pub vendor: String,
    pub family: String,
    pub model: String,
    pub stepping: String,
    pub is_64bit: bool,
    pub logical_cores: usize,
    pub physical_cores: usize,
}

impl CpuInfo {
    /// Identifier in the customary `<vendor> Family <f> Model <m> Stepping <s>` form
    pub fn identifier(&self) -> String {
        format!(
            "{} Family {} Model {} Stepping {}",
            self.vendor, self.family, self.model, self.stepping
        )
    }
}

/// Fields of `/proc/<pid>/stat` sysinfo does not report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PidStat {
    /// Clock ticks spent in user mode
    pub user_ticks: u64,
    /// Clock ticks spent in kernel mode
    pub system_ticks: u64,
    pub threads: u32,
}

impl PidStat {
    pub fn user_ms(&self, ticks_per_sec: u64) -> u64 {
        ticks_to_ms(self.user_ticks, ticks_per_sec)
    }

    pub fn kernel_ms(&self, ticks_per_sec: u64) -> u64 {
        ticks_to_ms(self.system_ticks, ticks_per_sec)
    }
}

fn ticks_to_ms(ticks: u64, ticks_per_sec: u64) -> u64 {
    ticks.saturating_mul(1000) / ticks_per_sec.max(1)
}

/// Parse the aggregate `cpu` line of `/proc/stat`
pub fn parse_cpu_ticks(content: &str) -> Option<CpuTicks> {
    let line = content
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|field| field.parse().unwrap_or(0))
        .collect();
    if fields.len() < 4 {
        return None;
    }

    let field = |i: usize| fields.get(i).copied().unwrap_or(0);
    Some(CpuTicks {
        user: field(0),
        nice: field(1),
        system: field(2),
        idle: field(3),
        iowait: field(4),
        irq: field(5),
        softirq: field(6),
        steal: field(7),
    })
}

/// Number of scheduling entities (threads) from the fourth field of `/proc/loadavg`
pub fn parse_loadavg_threads(content: &str) -> Option<u32> {
    content
        .split_whitespace()
        .nth(3)?
        .split('/')
        .nth(1)?
        .parse()
        .ok()
}

pub fn parse_cpuinfo(content: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    let mut cores = HashSet::new();
    let mut physical_id = String::new();

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "processor" => info.logical_cores += 1,
            "model name" if info.model_name.is_empty() => info.model_name = value.to_string(),
            "vendor_id" if info.vendor.is_empty() => info.vendor = value.to_string(),
            "cpu family" if info.family.is_empty() => info.family = value.to_string(),
            "model" if info.model.is_empty() => info.model = value.to_string(),
            "stepping" if info.stepping.is_empty() => info.stepping = value.to_string(),
            "flags" if !info.is_64bit => {
                info.is_64bit = value.split_whitespace().any(|flag| flag == "lm")
            }
            "physical id" => physical_id = value.to_string(),
            "core id" => {
                cores.insert((physical_id.clone(), value.to_string()));
            }
            _ => {}
        }
    }

    info.physical_cores = if cores.is_empty() {
        info.logical_cores
    } else {
        cores.len()
    };
    info
}

/// Parse `/proc/<pid>/stat`. The command name may contain spaces and
/// parentheses, so fields are counted from the last `)`.
pub fn parse_pid_stat(content: &str) -> Option<PidStat> {
    let after_name = &content[content.rfind(')')? + 1..];
    // Field 3 (state) is the first entry after the name
    let fields: Vec<&str> = after_name.split_whitespace().collect();
    let field = |n: usize| -> Option<u64> { fields.get(n - 3)?.parse().ok() };
    Some(PidStat {
        user_ticks: field(14)?,
        system_ticks: field(15)?,
        threads: u32::try_from(field(20)?).ok()?,
    })
}

/// IPv6 addresses per interface from `/proc/net/if_inet6`
pub fn parse_if_inet6(content: &str) -> BTreeMap<String, Vec<String>> {
    let mut addresses: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 || fields[0].len() != 32 {
            continue;
        }
        let Ok(raw) = u128::from_str_radix(fields[0], 16) else {
            continue;
        };
        let address = std::net::Ipv6Addr::from(raw);
        addresses
            .entry(fields[5].to_string())
            .or_default()
            .push(address.to_string());
    }
    addresses
}

/// A row of `/proc/net/route`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub interface: String,
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl Route {
    fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & u32::from(self.mask) == u32::from(self.destination)
    }
}

/// Route entries are little-endian hex words
fn parse_route_address(hex: &str) -> Option<Ipv4Addr> {
    let raw = u32::from_str_radix(hex, 16).ok()?;
    Some(Ipv4Addr::from(raw.swap_bytes()))
}

pub fn parse_routes(content: &str) -> Vec<Route> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 8 {
                return None;
            }
            Some(Route {
                interface: fields[0].to_string(),
                destination: parse_route_address(fields[1])?,
                mask: parse_route_address(fields[7])?,
            })
        })
        .collect()
}

/// Local (host) addresses listed in `/proc/net/fib_trie`
pub fn parse_fib_trie_locals(content: &str) -> Vec<Ipv4Addr> {
    let mut locals = Vec::new();
    let mut last_address: Option<Ipv4Addr> = None;

    for line in content.lines() {
        let trimmed = line.trim_start_matches(|c: char| c == ' ' || c == '|' || c == '+' || c == '-');
        let trimmed = trimmed.trim();
        if let Ok(address) = trimmed.parse::<Ipv4Addr>() {
            last_address = Some(address);
        } else if trimmed.starts_with("/32 host LOCAL") {
            if let Some(address) = last_address {
                if !locals.contains(&address) {
                    locals.push(address);
                }
            }
        }
    }
    locals
}

/// Assign each local IPv4 address to the interface whose most specific
/// route covers it; loopback addresses go to `lo`.
pub fn assign_ipv4_addresses(
    locals: &[Ipv4Addr],
    routes: &[Route],
) -> BTreeMap<String, Vec<String>> {
    let mut addresses: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for address in locals {
        let interface = if address.is_loopback() {
            Some("lo".to_string())
        } else {
            routes
                .iter()
                .filter(|route| u32::from(route.mask) != 0 && route.contains(*address))
                .max_by_key(|route| u32::from(route.mask).count_ones())
                .map(|route| route.interface.clone())
        };
        if let Some(interface) = interface {
            addresses.entry(interface).or_default().push(address.to_string());
        }
    }
    addresses
}

/// Location of the proc file system
#[derive(Debug, Clone)]
pub struct Procfs {
    root: PathBuf,
}

impl Default for Procfs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl Procfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.root.join(relative);
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    pub fn cpu_ticks(&self) -> Result<CpuTicks> {
        parse_cpu_ticks(&self.read("stat")?).ok_or_else(|| anyhow!("No cpu line in /proc/stat"))
    }

    pub fn thread_count(&self) -> Result<u32> {
        parse_loadavg_threads(&self.read("loadavg")?).ok_or_else(|| anyhow!("Malformed /proc/loadavg"))
    }

    pub fn cpu_info(&self) -> Result<CpuInfo> {
        Ok(parse_cpuinfo(&self.read("cpuinfo")?))
    }

    /// CPU time split and thread count of one process, `None` if it has exited
    pub fn process_stat(&self, pid: u32) -> Result<Option<PidStat>> {
        let path = self.root.join(pid.to_string()).join("stat");
        match std::fs::read_to_string(&path) {
            Ok(content) => parse_pid_stat(&content)
                .map(Some)
                .ok_or_else(|| anyhow!("Malformed {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Failed to read {}", path.display())),
        }
    }

    pub fn ipv4_addresses(&self) -> BTreeMap<String, Vec<String>> {
        let locals = self
            .read("net/fib_trie")
            .map(|content| parse_fib_trie_locals(&content))
            .unwrap_or_default();
        let routes = self
            .read("net/route")
            .map(|content| parse_routes(&content))
            .unwrap_or_default();
        assign_ipv4_addresses(&locals, &routes)
    }

    pub fn ipv6_addresses(&self) -> BTreeMap<String, Vec<String>> {
        self.read("net/if_inet6")
            .map(|content| parse_if_inet6(&content))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  4705 356 584 3699 23 0 11 0 0 0\n\
                        cpu0 1393 280 294 1838 9 0 6 0 0 0\n\
                        intr 114930548 113199788 3 0 5 263 0 4 [...]\n";

    const CPUINFO: &str = "processor\t: 0\n\
vendor_id\t: GenuineIntel\n\
cpu family\t: 6\n\
model\t\t: 158\n\
model name\t: Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz\n\
stepping\t: 10\n\
physical id\t: 0\n\
core id\t\t: 0\n\
flags\t\t: fpu vme de pse tsc msr pae mce lm constant_tsc\n\
\n\
processor\t: 1\n\
vendor_id\t: GenuineIntel\n\
cpu family\t: 6\n\
model\t\t: 158\n\
model name\t: Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz\n\
stepping\t: 10\n\
physical id\t: 0\n\
core id\t\t: 0\n\
flags\t\t: fpu vme de pse tsc msr pae mce lm constant_tsc\n\
\n\
processor\t: 2\n\
vendor_id\t: GenuineIntel\n\
cpu family\t: 6\n\
model\t\t: 158\n\
model name\t: Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz\n\
stepping\t: 10\n\
physical id\t: 0\n\
core id\t\t: 1\n\
flags\t\t: fpu vme de pse tsc msr pae mce lm constant_tsc\n";

    #[test]
    fn test_parse_cpu_ticks() {
        let ticks = parse_cpu_ticks(STAT).unwrap();
        assert_eq!(ticks.user, 4705);
        assert_eq!(ticks.nice, 356);
        assert_eq!(ticks.system, 584);
        assert_eq!(ticks.idle, 3699);
        assert_eq!(ticks.iowait, 23);
        assert_eq!(ticks.softirq, 11);
    }

    #[test]
    fn test_parse_cpu_ticks_rejects_short_lines() {
        assert_eq!(parse_cpu_ticks("cpu 1 2\n"), None);
        assert_eq!(parse_cpu_ticks("cpu0 1 2 3 4\n"), None);
    }

    #[test]
    fn test_parse_loadavg_threads() {
        assert_eq!(parse_loadavg_threads("0.52 0.58 0.59 3/1132 71654\n"), Some(1132));
        assert_eq!(parse_loadavg_threads("0.52 0.58"), None);
        assert_eq!(parse_loadavg_threads("0.52 0.58 0.59 1132 71654"), None);
    }

    #[test]
    fn test_parse_cpuinfo() {
        let info = parse_cpuinfo(CPUINFO);
        assert_eq!(info.model_name, "Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz");
        assert_eq!(info.vendor, "GenuineIntel");
        assert_eq!(info.family, "6");
        assert_eq!(info.model, "158");
        assert!(info.is_64bit);
        assert_eq!(info.logical_cores, 3);
        assert_eq!(info.physical_cores, 2);
        assert_eq!(info.identifier(), "GenuineIntel Family 6 Model 158 Stepping 10");
    }

    #[test]
    fn test_parse_pid_stat_with_awkward_name() {
        let content = "4242 (my (odd) proc) S 1 4242 4242 0 -1 4194560 1234 0 0 0 250 75 0 0 20 0 6 0 12000 10000000 500 18446744073709551615";
        let stat = parse_pid_stat(content).unwrap();
        assert_eq!(stat.user_ticks, 250);
        assert_eq!(stat.system_ticks, 75);
        assert_eq!(stat.threads, 6);
    }

    #[test]
    fn test_pid_stat_times_follow_clock_rate() {
        let stat = PidStat {
            user_ticks: 250,
            system_ticks: 75,
            threads: 4,
        };
        assert_eq!(stat.user_ms(100), 2_500);
        assert_eq!(stat.kernel_ms(100), 750);
        assert_eq!(stat.user_ms(250), 1_000);
        assert_eq!(stat.kernel_ms(0), 75_000);
    }

    #[test]
    fn test_clock_rate_is_positive() {
        assert!(clock_ticks_per_sec() > 0);
    }

    #[test]
    fn test_parse_if_inet6() {
        let content = "00000000000000000000000000000001 01 80 10 80       lo\n\
                       fe80000000000000505400fffe123456 02 40 20 80     eth0\n";
        let addresses = parse_if_inet6(content);
        assert_eq!(addresses["lo"], vec!["::1"]);
        assert_eq!(addresses["eth0"], vec!["fe80::5054:ff:fe12:3456"]);
    }

    #[test]
    fn test_ipv4_assignment() {
        let routes = parse_routes(
            "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT\n\
             eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0\n\
             eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0\n\
             docker0\t000011AC\t00000000\t0001\t0\t0\t0\t0000FFFF\t0\t0\t0\n",
        );
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[1].destination, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(routes[1].mask, Ipv4Addr::new(255, 255, 255, 0));

        let trie = "Main:\n  +-- 0.0.0.0/0 3 0 5\n     |-- 0.0.0.0\n        /0 universe UNICAST\n\
                    Local:\n  +-- 127.0.0.0/8 2 0 2\n     |-- 127.0.0.1\n        /32 host LOCAL\n\
                    |-- 192.168.1.20\n        /32 host LOCAL\n\
                    |-- 192.168.1.255\n        /32 link BROADCAST\n\
                    |-- 172.17.0.1\n        /32 host LOCAL\n";
        let locals = parse_fib_trie_locals(trie);
        assert_eq!(
            locals,
            vec![
                Ipv4Addr::new(127, 0, 0, 1),
                Ipv4Addr::new(192, 168, 1, 20),
                Ipv4Addr::new(172, 17, 0, 1)
            ]
        );

        let assigned = assign_ipv4_addresses(&locals, &routes);
        assert_eq!(assigned["lo"], vec!["127.0.0.1"]);
        assert_eq!(assigned["eth0"], vec!["192.168.1.20"]);
        assert_eq!(assigned["docker0"], vec!["172.17.0.1"]);
    }

    #[test]
    fn test_procfs_reads_files_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stat"), STAT).unwrap();
        std::fs::write(dir.path().join("loadavg"), "1.00 0.50 0.25 2/300 1\n").unwrap();
        std::fs::create_dir(dir.path().join("77")).unwrap();
        std::fs::write(
            dir.path().join("77/stat"),
            "77 (worker) R 1 77 77 0 -1 0 0 0 0 0 10 20 0 0 20 0 2 0 100 0 0",
        )
        .unwrap();

        let procfs = Procfs::new(dir.path());
        assert_eq!(procfs.cpu_ticks().unwrap().user, 4705);
        assert_eq!(procfs.thread_count().unwrap(), 300);

        let stat = procfs.process_stat(77).unwrap().unwrap();
        assert_eq!(stat.user_ticks, 10);
        assert_eq!(stat.system_ticks, 20);
        assert_eq!(stat.threads, 2);
        assert!(procfs.process_stat(78).unwrap().is_none());
        assert!(procfs.cpu_info().is_err());
    }
}
