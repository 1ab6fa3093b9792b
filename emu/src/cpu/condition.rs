//! # Conditional execution
//!
//! Every ARM instruction carries a condition in bits 28-31; in Thumb state
//! only the conditional branch (format 16) does.
//!
//! ```text
//! ┌───────┬────────┬─────────────────────────────┐
//! │ Code  │ Suffix │ Flags tested                │
//! ├───────┼────────┼─────────────────────────────┤
//! │ 0000  │   EQ   │ Z=1                         │
//! │ 0001  │   NE   │ Z=0                         │
//! │ 0010  │   CS   │ C=1                         │
//! │ 0011  │   CC   │ C=0                         │
//! │ 0100  │   MI   │ N=1                         │
//! │ 0101  │   PL   │ N=0                         │
//! │ 0110  │   VS   │ V=1                         │
//! │ 0111  │   VC   │ V=0                         │
//! │ 1000  │   HI   │ C=1 AND Z=0                 │
//! │ 1001  │   LS   │ C=0 OR Z=1                  │
//! │ 1010  │   GE   │ N=V                         │
//! │ 1011  │   LT   │ N≠V                         │
//! │ 1100  │   GT   │ Z=0 AND N=V                 │
//! │ 1101  │   LE   │ Z=1 OR N≠V                  │
//! │ 1110  │   AL   │ always                      │
//! │ 1111  │   NV   │ never (ARMv4: reserved)     │
//! └───────┴────────┴─────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

/// Condition codes for ARM conditional execution.
///
/// If the CPSR flags satisfy the condition the instruction executes,
/// otherwise it retires as a one cycle no-op.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum Condition {
    /// Equal (Z=1)
    EQ = 0x0,
    /// Not equal (Z=0)
    NE = 0x1,
    /// Carry set / unsigned higher or same (C=1)
    CS = 0x2,
    /// Carry clear / unsigned lower (C=0)
    CC = 0x3,
    /// Minus / negative (N=1)
    MI = 0x4,
    /// Plus / positive or zero (N=0)
    PL = 0x5,
    /// Overflow set (V=1)
    VS = 0x6,
    /// Overflow clear (V=0)
    VC = 0x7,
    /// Unsigned higher (C=1 AND Z=0)
    HI = 0x8,
    /// Unsigned lower or same (C=0 OR Z=1)
    LS = 0x9,
    /// Signed greater or equal (N=V)
    GE = 0xA,
    /// Signed less than (N≠V)
    LT = 0xB,
    /// Signed greater than (Z=0 AND N=V)
    GT = 0xC,
    /// Signed less than or equal (Z=1 OR N≠V)
    LE = 0xD,
    /// Always (unconditional)
    AL = 0xE,
    /// Never. Reserved on ARMv4, treated as never executing.
    NV = 0xF,
}

impl From<u8> for Condition {
    fn from(item: u8) -> Self {
        match item & 0xF {
            0x0 => Self::EQ,
            0x1 => Self::NE,
            0x2 => Self::CS,
            0x3 => Self::CC,
            0x4 => Self::MI,
            0x5 => Self::PL,
            0x6 => Self::VS,
            0x7 => Self::VC,
            0x8 => Self::HI,
            0x9 => Self::LS,
            0xA => Self::GE,
            0xB => Self::LT,
            0xC => Self::GT,
            0xD => Self::LE,
            0xE => Self::AL,
            _ => Self::NV,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EQ => f.write_str("EQ"),
            Self::NE => f.write_str("NE"),
            Self::CS => f.write_str("CS"),
            Self::CC => f.write_str("CC"),
            Self::MI => f.write_str("MI"),
            Self::PL => f.write_str("PL"),
            Self::VS => f.write_str("VS"),
            Self::VC => f.write_str("VC"),
            Self::HI => f.write_str("HI"),
            Self::LS => f.write_str("LS"),
            Self::GE => f.write_str("GE"),
            Self::LT => f.write_str("LT"),
            Self::GT => f.write_str("GT"),
            Self::LE => f.write_str("LE"),
            Self::AL => Ok(()),
            Self::NV => f.write_str("NV"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_from_nibble() {
        assert_eq!(Condition::from(0x0), Condition::EQ);
        assert_eq!(Condition::from(0xE), Condition::AL);
        assert_eq!(Condition::from(0xF), Condition::NV);
        // Only the low nibble matters.
        assert_eq!(Condition::from(0x1B), Condition::LT);
    }

    #[test]
    fn check_display() {
        assert_eq!(Condition::GT.to_string(), "GT");
        assert_eq!(Condition::AL.to_string(), "");
    }
}
