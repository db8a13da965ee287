use crate::config::TuningSettings;
use crate::process::{CommandRunner, Output};
use std::path::Path;
use tracing::{debug, warn};

pub const PERF_PATH: &str = "/usr/bin/perf";
pub const TIME_PATH: &str = "/usr/bin/time";
pub const CHRT_PATH: &str = "/usr/bin/chrt";
pub const NICE_PATH: &str = "/usr/bin/nice";
pub const TURBOCTL_PATH: &str = "/usr/bin/turboctl";
pub const CPUPOWER_PATH: &str = "/usr/bin/cpupower";
pub const NOSYNC_LIB: &str = "/usr/lib64/nosync/nosync.so";

/// External helpers found on this host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub perf: bool,
    pub time: bool,
    pub chrt: bool,
    pub nice: bool,
    pub turboctl: bool,
    pub cpupower: bool,
    pub nosync: bool,
}

impl Capabilities {
    /// Checks which helpers are installed. Done once per session.
    pub fn probe() -> Self {
        let present = |path: &str| Path::new(path).exists();
        let caps = Capabilities {
            perf: present(PERF_PATH),
            time: present(TIME_PATH),
            chrt: present(CHRT_PATH),
            nice: present(NICE_PATH),
            turboctl: present(TURBOCTL_PATH),
            cpupower: present(CPUPOWER_PATH),
            nosync: present(NOSYNC_LIB),
        };
        debug!(?caps, "probed capabilities");
        caps
    }
}

/// Scheduling priority for benchmarked commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// SCHED_FIFO at priority 99
    Realtime,
    /// Niceness -20
    Nice,
    Normal,
}

impl Priority {
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            Priority::Realtime => Some("/usr/bin/chrt -f 99"),
            Priority::Nice => Some("/usr/bin/nice -n -20"),
            Priority::Normal => None,
        }
    }
}

/// Applies and reverts the configured system tweaks. Every action is best
/// effort: a missing helper or a failing command only produces a warning.
#[derive(Debug, Clone)]
pub struct SystemTuning {
    settings: TuningSettings,
    turboctl: bool,
    cpupower: bool,
    nosync: bool,
    priority: Priority,
}

impl SystemTuning {
    pub fn new(settings: &TuningSettings, caps: &Capabilities) -> Self {
        let turboctl = settings.use_turboctl && caps.turboctl;
        if settings.use_turboctl && !caps.turboctl {
            warn!("{} not found, proceeding without it", TURBOCTL_PATH);
        }

        let cpupower = settings.use_cpupower && caps.cpupower;
        if settings.use_cpupower && !caps.cpupower {
            warn!("{} not found, proceeding without it", CPUPOWER_PATH);
        }

        let nosync = settings.use_nosync && caps.nosync;
        if settings.use_nosync && !caps.nosync {
            warn!("{} not found, proceeding without it", NOSYNC_LIB);
        }

        let priority = if settings.use_chrt && caps.chrt {
            Priority::Realtime
        } else if caps.nice {
            if settings.use_chrt {
                warn!("{} not found, falling back to nice", CHRT_PATH);
            }
            Priority::Nice
        } else {
            warn!("priority tool not found, proceeding without it");
            Priority::Normal
        };

        SystemTuning {
            settings: settings.clone(),
            turboctl,
            cpupower,
            nosync,
            priority,
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Environment overrides for benchmarked commands.
    pub fn bench_env(&self) -> Vec<(String, String)> {
        if self.nosync {
            vec![("LD_PRELOAD".to_string(), NOSYNC_LIB.to_string())]
        } else {
            Vec::new()
        }
    }

    /// Commands that pin the CPU to a fixed speed. Requires sudo rights.
    pub fn enable_commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        if self.turboctl {
            commands.push(format!("sudo {} off", TURBOCTL_PATH));
        }
        if self.cpupower {
            let khz = self.settings.cpu_bench_speed * 1000;
            commands.push(format!(
                "sudo {} frequency-set -g performance --min {} --max {}",
                CPUPOWER_PATH, khz, khz
            ));
            commands.push(format!("sudo {} idle-set -D 2", CPUPOWER_PATH));
        }
        commands
    }

    /// Commands restoring turbo, power saving and the normal speed range.
    pub fn disable_commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        if self.turboctl {
            commands.push(format!("sudo {} on", TURBOCTL_PATH));
        }
        if self.cpupower {
            commands.push(format!(
                "sudo {} frequency-set --min {} --max {}",
                CPUPOWER_PATH,
                self.settings.cpu_std_minspeed * 1000,
                self.settings.cpu_std_maxspeed * 1000
            ));
            commands.push(format!("sudo {} idle-set -E", CPUPOWER_PATH));
        }
        commands
    }

    pub fn enable<R: CommandRunner>(&self, runner: &mut R) {
        for command in self.enable_commands() {
            best_effort(runner, &command);
        }
    }

    pub fn disable<R: CommandRunner>(&self, runner: &mut R) {
        for command in self.disable_commands() {
            best_effort(runner, &command);
        }
    }
}

fn best_effort<R: CommandRunner>(runner: &mut R, command: &str) {
    match runner.run(command, &[], Output::Null, false) {
        Ok(0) => {}
        Ok(code) => warn!(code, command, "tuning command failed"),
        Err(e) => warn!(command, "tuning command failed: {}", e),
    }
}

/// Flushes filesystem buffers before a measurement.
pub fn sync_caches<R: CommandRunner>(runner: &mut R) {
    if cfg!(unix) {
        if let Err(e) = runner.run("sync", &[], Output::Null, false) {
            debug!("sync failed: {}", e);
        }
    }
}

/// One line describing the host operating system.
#[cfg(unix)]
pub fn system_info() -> String {
    use std::ffi::CStr;

    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut uts) } != 0 {
        return format!("OS: {} {}", std::env::consts::OS, std::env::consts::ARCH);
    }
    let field = |raw: &[libc::c_char]| {
        unsafe { CStr::from_ptr(raw.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    };
    format!(
        "OS: {} {} {} {}",
        field(&uts.sysname),
        field(&uts.release),
        field(&uts.version),
        field(&uts.machine)
    )
}

#[cfg(not(unix))]
pub fn system_info() -> String {
    format!("OS: {} {}", std::env::consts::OS, std::env::consts::ARCH)
}

/// CPU model name from /proc/cpuinfo, when available.
pub fn cpu_model() -> Option<String> {
    let info = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    info.lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, name)| name.trim().to_string())
}
