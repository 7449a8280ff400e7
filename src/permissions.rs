use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::{FsError, FsResult};

bitflags! {
    /// Owner/group/other read-write-execute bits, laid out like Unix mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u16 {
        const OTHER_EXECUTE = 1 << 0;
        const OTHER_WRITE   = 1 << 1;
        const OTHER_READ    = 1 << 2;

        const GROUP_EXECUTE = 1 << 3;
        const GROUP_WRITE   = 1 << 4;
        const GROUP_READ    = 1 << 5;

        const OWNER_EXECUTE = 1 << 6;
        const OWNER_WRITE   = 1 << 7;
        const OWNER_READ    = 1 << 8;
    }
}

/// The kind of access an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Permissions {
    /// Parses a three-digit octal mode such as `"755"`. A single leading `0` is accepted.
    pub fn from_octal(mode: &str) -> FsResult<Self> {
        let invalid = || FsError::InvalidPermission(mode.to_string());

        let digits = match mode.len() {
            4 => mode.strip_prefix('0').ok_or_else(invalid)?,
            3 => mode,
            _ => return Err(invalid()),
        };

        if !digits.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            return Err(invalid());
        }

        let bits = u16::from_str_radix(digits, 8).map_err(|_| invalid())?;
        Self::from_bits(bits).ok_or_else(invalid)
    }

    /// The mode as a plain number, e.g. `0o755`.
    pub fn mode(self) -> u16 {
        self.bits()
    }

    /// Checks `access` against the owner triad if `is_owner`, otherwise against the other triad.
    pub fn allows(self, access: Access, is_owner: bool) -> bool {
        let required = match (access, is_owner) {
            (Access::Read, true) => Self::OWNER_READ,
            (Access::Write, true) => Self::OWNER_WRITE,
            (Access::Execute, true) => Self::OWNER_EXECUTE,
            (Access::Read, false) => Self::OTHER_READ,
            (Access::Write, false) => Self::OTHER_WRITE,
            (Access::Execute, false) => Self::OTHER_EXECUTE,
        };

        self.contains(required)
    }
}

impl FromStr for Permissions {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_octal(s)
    }
}

/// Formats as `rwxr-xr-x`. The alternate form (`{:#}`) prints the octal mode instead.
impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return write!(f, "{:03o}", self.bits());
        }

        const SYMBOLS: [(Permissions, char); 9] = [
            (Permissions::OWNER_READ, 'r'),
            (Permissions::OWNER_WRITE, 'w'),
            (Permissions::OWNER_EXECUTE, 'x'),
            (Permissions::GROUP_READ, 'r'),
            (Permissions::GROUP_WRITE, 'w'),
            (Permissions::GROUP_EXECUTE, 'x'),
            (Permissions::OTHER_READ, 'r'),
            (Permissions::OTHER_WRITE, 'w'),
            (Permissions::OTHER_EXECUTE, 'x'),
        ];

        for (flag, symbol) in SYMBOLS {
            let c = if self.contains(flag) { symbol } else { '-' };
            write!(f, "{c}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_modes() {
        assert_eq!(Permissions::from_octal("755").unwrap().mode(), 0o755);
        assert_eq!(Permissions::from_octal("0644").unwrap().mode(), 0o644);
        assert_eq!(Permissions::from_octal("000").unwrap(), Permissions::empty());
        assert_eq!(Permissions::from_octal("777").unwrap(), Permissions::all());
    }

    #[test]
    fn test_parse_invalid_modes() {
        for mode in ["", "75", "7777", "1755", "800", "75x", "-75", "rwx"] {
            assert_eq!(
                Permissions::from_octal(mode),
                Err(FsError::InvalidPermission(mode.to_string())),
                "{mode:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display() {
        let perms: Permissions = "754".parse().unwrap();
        assert_eq!(perms.to_string(), "rwxr-xr--");
        assert_eq!(format!("{perms:#}"), "754");
        assert_eq!(Permissions::empty().to_string(), "---------");
    }

    #[test]
    fn test_allows_uses_matching_triad() {
        let perms = Permissions::from_octal("604").unwrap();

        assert!(perms.allows(Access::Read, true));
        assert!(perms.allows(Access::Write, true));
        assert!(!perms.allows(Access::Execute, true));

        assert!(perms.allows(Access::Read, false));
        assert!(!perms.allows(Access::Write, false));
    }
}
