//! Command guard for SSH-style remote execution.
//!
//! The blocklist always runs before the allowlist: a command containing a
//! dangerous token is rejected even if it starts with an allowed prefix,
//! so `df -h; rm -rf /` never reaches a shell.

use super::PolicyViolation;

/// Tokens that make a command dangerous regardless of its prefix:
/// chaining, redirection, substitution, and destructive binaries.
/// Matched case-insensitively against the whole command.
const BLOCKED_TOKENS: &[&str] = &[
    ";",
    "&&",
    "||",
    "|",
    ">",
    "<",
    "`",
    "$(",
    "\n",
    "rm ",
    "rm\t",
    "rmdir",
    "mkfs",
    "dd ",
    "shutdown",
    "reboot",
    "poweroff",
    "halt",
    "init 0",
    "init 6",
    "kill ",
    "killall",
    "chmod 777",
    "chown ",
    "mv ",
    "truncate",
    "shred",
    "sudo su",
    "passwd",
    "useradd",
    "userdel",
    "visudo",
    "crontab",
    ":(){",
];

/// Prefixes a command may start with once it has cleared the blocklist.
/// All read-only observation commands.
const ALLOWED_PREFIXES: &[&str] = &[
    "uptime",
    "whoami",
    "hostname",
    "uname",
    "date",
    "df",
    "du -s",
    "free",
    "ps",
    "top -b -n 1",
    "vmstat",
    "iostat",
    "sensors",
    "ls ",
    "cat /proc/",
    "cat /sys/",
    "cat /etc/os-release",
    "systemctl status",
    "systemctl list-units",
    "journalctl --no-pager -n",
    "docker ps",
    "docker stats --no-stream",
    "docker info",
    "docker version",
    "ip addr",
    "ip link",
    "ss -tuln",
    "smartctl",
    "zpool status",
    "zfs list",
];

/// Validates commands destined for remote execution. Pure function, no
/// shared state; a rejection is never retryable.
#[derive(Debug, Clone, Default)]
pub struct SshCommandPolicy;

impl SshCommandPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Blocklist check first, allowlist second. Empty or whitespace-only
    /// commands are rejected outright.
    pub fn validate_command(&self, command: &str) -> Result<(), PolicyViolation> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(PolicyViolation::new("Empty command is not permitted"));
        }

        let lowered = trimmed.to_lowercase();
        for token in BLOCKED_TOKENS {
            if lowered.contains(token) {
                return Err(PolicyViolation::new(format!(
                    "Command contains blocked token {:?}",
                    token
                )));
            }
        }

        if ALLOWED_PREFIXES
            .iter()
            .any(|prefix| lowered.starts_with(prefix))
        {
            Ok(())
        } else {
            Err(PolicyViolation::new(format!(
                "Command {:?} does not match any allowed prefix",
                trimmed
            )))
        }
    }
}
