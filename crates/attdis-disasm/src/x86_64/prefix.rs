//! x86 prefix parsing.

use crate::cursor::ByteCursor;
use crate::DecodeError;
use attdis_core::register::seg;
use attdis_core::Register;
use bitflags::bitflags;

bitflags! {
    /// Named prefix bits accumulated before an opcode.
    ///
    /// VEX subsumes REX: the un-inverted VEX.R/X/B/W bits are folded into the
    /// `REX_*` bits, and `REX` itself only marks a real REX byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrefixFlags: u16 {
        /// Operand size override (0x66)
        const OPERAND_SIZE = 1 << 0;
        /// Address size override (0x67)
        const ADDRESS_SIZE = 1 << 1;
        /// REP/REPE/REPZ (0xF3)
        const REP = 1 << 2;
        /// REPNE/REPNZ (0xF2)
        const REPNE = 1 << 3;
        /// LOCK (0xF0)
        const LOCK = 1 << 4;
        /// A REX byte (0x40-0x4F) immediately precedes the opcode.
        const REX = 1 << 5;
        /// 64-bit operand size
        const REX_W = 1 << 6;
        /// Extends ModR/M reg
        const REX_R = 1 << 7;
        /// Extends SIB index
        const REX_X = 1 << 8;
        /// Extends ModR/M r/m, SIB base, or opcode reg
        const REX_B = 1 << 9;
        /// VEX prefix (0xC4/0xC5)
        const VEX = 1 << 10;
        /// VEX.L - 256-bit vector length
        const VEX_L = 1 << 11;

        const REX_BITS = Self::REX.bits()
            | Self::REX_W.bits()
            | Self::REX_R.bits()
            | Self::REX_X.bits()
            | Self::REX_B.bits();
    }
}

/// Mandatory SIMD prefix, from a legacy byte or VEX.pp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdPrefix {
    None,
    P66,
    F3,
    F2,
}

/// Default operand width of an opcode when no prefix overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandDefault {
    /// Most instructions: 32 bits, REX.W selects 64.
    Bits32,
    /// Stack and near-branch instructions: 64 bits, 0x66 selects 16.
    Bits64,
}

/// VEX prefix (used for AVX instructions).
/// Can be 2-byte (0xC5) or 3-byte (0xC4).
#[derive(Debug, Clone, Copy, Default)]
struct Vex {
    /// Un-inverted VEX.R
    r: bool,
    /// Un-inverted VEX.X (only in 3-byte VEX)
    x: bool,
    /// Un-inverted VEX.B (only in 3-byte VEX)
    b: bool,
    /// VEX.W
    w: bool,
    /// VEX.vvvv exactly as encoded (one's complement of the register)
    vvvv: u8,
    /// VEX.L
    l: bool,
    /// VEX.pp
    pp: u8,
    /// VEX.mmmmm (1=0x0F, 2=0x0F38, 3=0x0F3A)
    map: u8,
}

impl Vex {
    /// Parse a 2-byte VEX prefix (C5 RvvvvLpp).
    fn from_2byte(byte1: u8) -> Self {
        Self {
            r: (byte1 & 0x80) == 0,
            x: false,
            b: false,
            w: false,
            vvvv: (byte1 >> 3) & 0x0F,
            l: (byte1 & 0x04) != 0,
            pp: byte1 & 0x03,
            map: 1,
        }
    }

    /// Parse a 3-byte VEX prefix (C4 RXBmmmmm WvvvvLpp).
    fn from_3byte(byte1: u8, byte2: u8) -> Self {
        Self {
            r: (byte1 & 0x80) == 0,
            x: (byte1 & 0x40) == 0,
            b: (byte1 & 0x20) == 0,
            w: (byte2 & 0x80) != 0,
            vvvv: (byte2 >> 3) & 0x0F,
            l: (byte2 & 0x04) != 0,
            pp: byte2 & 0x03,
            map: byte1 & 0x1F,
        }
    }
}

/// Everything the prefix run said about the instruction that follows.
///
/// Created fresh for each instruction and never mutated once parsing ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefixes {
    flags: PrefixFlags,
    /// VEX.vvvv as encoded; the register is `vvvv ^ 0xF`.
    vvvv: u8,
    vex_pp: u8,
    vex_map: u8,
    segment: Option<u8>,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self {
            flags: PrefixFlags::empty(),
            vvvv: 0x0F,
            vex_pp: 0,
            vex_map: 0,
            segment: None,
        }
    }
}

impl Prefixes {
    /// Builds prefixes from raw parts. Mostly useful for tests.
    pub fn from_flags(flags: PrefixFlags, vvvv: u8) -> Self {
        Self {
            flags,
            vvvv: vvvv & 0x0F,
            vex_map: if flags.contains(PrefixFlags::VEX) { 1 } else { 0 },
            ..Self::default()
        }
    }

    /// Consume the prefix run at the cursor.
    ///
    /// Any byte that is not a prefix ends the scan and is left for the
    /// opcode dispatcher.
    pub fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, DecodeError> {
        let mut prefixes = Self::default();

        while let Some(byte) = cursor.peek() {
            match byte {
                // Group 1: LOCK and repeat
                0xF0 => prefixes.legacy(PrefixFlags::LOCK),
                0xF2 => {
                    prefixes.flags.remove(PrefixFlags::REP);
                    prefixes.legacy(PrefixFlags::REPNE);
                }
                0xF3 => {
                    prefixes.flags.remove(PrefixFlags::REPNE);
                    prefixes.legacy(PrefixFlags::REP);
                }

                // Group 2: Segment overrides
                0x26 => prefixes.segment_override(seg::ES),
                0x2E => prefixes.segment_override(seg::CS),
                0x36 => prefixes.segment_override(seg::SS),
                0x3E => prefixes.segment_override(seg::DS),
                0x64 => prefixes.segment_override(seg::FS),
                0x65 => prefixes.segment_override(seg::GS),

                // Group 3/4: operand and address size
                0x66 => prefixes.legacy(PrefixFlags::OPERAND_SIZE),
                0x67 => prefixes.legacy(PrefixFlags::ADDRESS_SIZE),

                // REX, only meaningful if nothing but the opcode follows
                0x40..=0x4F => {
                    prefixes.flags.remove(PrefixFlags::REX_BITS);
                    prefixes.flags.insert(PrefixFlags::REX);
                    prefixes.flags.set(PrefixFlags::REX_W, byte & 0x08 != 0);
                    prefixes.flags.set(PrefixFlags::REX_R, byte & 0x04 != 0);
                    prefixes.flags.set(PrefixFlags::REX_X, byte & 0x02 != 0);
                    prefixes.flags.set(PrefixFlags::REX_B, byte & 0x01 != 0);
                }

                // In 64-bit mode 0xC4/0xC5 are always VEX
                0xC5 => {
                    cursor.skip(1)?;
                    let vex = Vex::from_2byte(cursor.read_u8()?);
                    prefixes.apply_vex(vex);
                    return Ok(prefixes);
                }
                0xC4 => {
                    cursor.skip(1)?;
                    let [byte1, byte2] = cursor.read_bytes::<2>()?;
                    prefixes.apply_vex(Vex::from_3byte(byte1, byte2));
                    return Ok(prefixes);
                }

                _ => break,
            }

            cursor.skip(1)?;
        }

        Ok(prefixes)
    }

    /// A legacy prefix after REX cancels the REX.
    fn legacy(&mut self, flag: PrefixFlags) {
        self.flags.remove(PrefixFlags::REX_BITS);
        self.flags.insert(flag);
    }

    fn segment_override(&mut self, segment: u8) {
        self.flags.remove(PrefixFlags::REX_BITS);
        self.segment = Some(segment);
    }

    fn apply_vex(&mut self, vex: Vex) {
        self.flags.remove(PrefixFlags::REX_BITS);
        self.flags.insert(PrefixFlags::VEX);
        self.flags.set(PrefixFlags::VEX_L, vex.l);
        self.flags.set(PrefixFlags::REX_W, vex.w);
        self.flags.set(PrefixFlags::REX_R, vex.r);
        self.flags.set(PrefixFlags::REX_X, vex.x);
        self.flags.set(PrefixFlags::REX_B, vex.b);
        self.vvvv = vex.vvvv;
        self.vex_pp = vex.pp;
        self.vex_map = vex.map;
    }

    /// Raw flag set.
    pub fn flags(&self) -> PrefixFlags {
        self.flags
    }

    /// Returns true if this is a VEX-encoded instruction.
    pub fn has_vex(&self) -> bool {
        self.flags.contains(PrefixFlags::VEX)
    }

    /// Returns true if 0x66 was seen.
    pub fn operand_size_override(&self) -> bool {
        self.flags.contains(PrefixFlags::OPERAND_SIZE)
    }

    /// Returns true if 0x67 was seen.
    pub fn address_size_override(&self) -> bool {
        self.flags.contains(PrefixFlags::ADDRESS_SIZE)
    }

    /// Returns true for 256-bit (ymm) VEX forms.
    pub fn vector_width_256(&self) -> bool {
        self.flags.contains(PrefixFlags::VEX_L)
    }

    /// REX.W or VEX.W.
    pub fn rex_w(&self) -> bool {
        self.flags.contains(PrefixFlags::REX_W)
    }

    /// REX.R or VEX.R, as a register index extension bit.
    pub fn rex_r(&self) -> u8 {
        self.flags.contains(PrefixFlags::REX_R) as u8
    }

    /// REX.X or VEX.X, as a register index extension bit.
    pub fn rex_x(&self) -> u8 {
        self.flags.contains(PrefixFlags::REX_X) as u8
    }

    /// REX.B or VEX.B, as a register index extension bit.
    pub fn rex_b(&self) -> u8 {
        self.flags.contains(PrefixFlags::REX_B) as u8
    }

    /// Returns true if a REX byte is in effect (selects spl/bpl/sil/dil).
    pub fn rex_present(&self) -> bool {
        self.flags.contains(PrefixFlags::REX)
    }

    /// Returns true if 0xF3 was the last repeat prefix.
    pub fn rep(&self) -> bool {
        self.flags.contains(PrefixFlags::REP)
    }

    /// Returns true if 0xF2 was the last repeat prefix.
    pub fn repne(&self) -> bool {
        self.flags.contains(PrefixFlags::REPNE)
    }

    /// Returns true if 0xF0 was seen.
    pub fn lock(&self) -> bool {
        self.flags.contains(PrefixFlags::LOCK)
    }

    /// The stored VEX.vvvv field, exactly as encoded.
    pub fn vvvv_field(&self) -> u8 {
        self.vvvv
    }

    /// The register named by VEX.vvvv.
    pub fn vvvv_register(&self) -> u8 {
        self.vvvv ^ 0x0F
    }

    /// The VEX opcode map (1 = 0F, 2 = 0F38, 3 = 0F3A), 0 without VEX.
    pub fn vex_map(&self) -> u8 {
        self.vex_map
    }

    /// The segment override register, if any.
    pub fn segment(&self) -> Option<Register> {
        self.segment.map(Register::segment)
    }

    /// The mandatory SIMD prefix. VEX.pp is authoritative when VEX is present.
    pub fn simd_prefix(&self) -> SimdPrefix {
        if self.has_vex() {
            return match self.vex_pp {
                1 => SimdPrefix::P66,
                2 => SimdPrefix::F3,
                3 => SimdPrefix::F2,
                _ => SimdPrefix::None,
            };
        }
        if self.repne() {
            SimdPrefix::F2
        } else if self.rep() {
            SimdPrefix::F3
        } else if self.operand_size_override() {
            SimdPrefix::P66
        } else {
            SimdPrefix::None
        }
    }

    /// Returns the effective operand size in bits.
    ///
    /// 0x66 wins over REX.W, REX.W wins over the opcode default.
    pub fn operand_size(&self, default: OperandDefault) -> u16 {
        if self.operand_size_override() {
            16
        } else if self.rex_w() {
            64
        } else {
            match default {
                OperandDefault::Bits32 => 32,
                OperandDefault::Bits64 => 64,
            }
        }
    }

    /// Returns the effective address size in bits.
    pub fn address_size(&self) -> u16 {
        if self.address_size_override() {
            32
        } else {
            64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> (Prefixes, usize) {
        let mut cursor = ByteCursor::new(bytes, 0);
        let prefixes = Prefixes::parse(&mut cursor).unwrap();
        (prefixes, cursor.position())
    }

    #[test]
    fn test_no_prefix() {
        let (p, len) = parse(&[0x90]);
        assert_eq!(len, 0);
        assert_eq!(p.flags(), PrefixFlags::empty());
    }

    #[test]
    fn test_legacy_and_rex() {
        let (p, len) = parse(&[0x66, 0xF3, 0x48, 0x6D]);
        assert_eq!(len, 3);
        assert!(p.operand_size_override());
        assert!(p.rep());
        assert!(p.rex_w());
        assert!(p.rex_present());
    }

    #[test]
    fn test_rex_before_legacy_prefix_is_dropped() {
        let (p, len) = parse(&[0x48, 0x66, 0x01]);
        assert_eq!(len, 2);
        assert!(!p.rex_w());
        assert!(!p.rex_present());
        assert!(p.operand_size_override());
    }

    #[test]
    fn test_later_repeat_prefix_wins() {
        let (p, _) = parse(&[0xF3, 0xF2, 0xA6]);
        assert!(p.repne());
        assert!(!p.rep());
    }

    #[test]
    fn test_vex2() {
        // vpacksswb: C5 F1 63 -> R=1, vvvv=1110 (xmm1), L=0, pp=01
        let (p, len) = parse(&[0xC5, 0xF1, 0x63, 0xC2]);
        assert_eq!(len, 2);
        assert!(p.has_vex());
        assert!(!p.vector_width_256());
        assert_eq!(p.vvvv_field(), 0x0E);
        assert_eq!(p.vvvv_register(), 1);
        assert_eq!(p.simd_prefix(), SimdPrefix::P66);
        assert_eq!(p.vex_map(), 1);
        assert_eq!(p.rex_r(), 0);
    }

    #[test]
    fn test_vex3_extension_bits() {
        // C4 41 75 ..: R=0 X=1 B=0 inverted -> R, B set; W=0 vvvv=1110 L=1 pp=01
        let (p, len) = parse(&[0xC4, 0x41, 0x75, 0x63]);
        assert_eq!(len, 3);
        assert_eq!(p.rex_r(), 1);
        assert_eq!(p.rex_x(), 0);
        assert_eq!(p.rex_b(), 1);
        assert!(p.vector_width_256());
        assert_eq!(p.vvvv_register(), 1);
    }

    #[test]
    fn test_vex_overrides_rex() {
        let (p, len) = parse(&[0x4C, 0xC5, 0xF9, 0x6E]);
        assert_eq!(len, 3);
        assert!(p.has_vex());
        assert!(!p.rex_present());
        assert_eq!(p.rex_r(), 0);
        assert!(!p.rex_w());
    }

    #[test]
    fn test_truncated_vex() {
        let mut cursor = ByteCursor::new(&[0xC4, 0xE1], 0x2000);
        let err = Prefixes::parse(&mut cursor).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { needed: 3, .. }));
    }

    #[test]
    fn test_segment_override() {
        let (p, _) = parse(&[0x64, 0x48, 0x8B]);
        assert_eq!(p.segment().map(|r| r.name()), Some("fs"));
        assert!(p.rex_w());
    }

    #[test]
    fn test_vvvv_complement() {
        for field in 0u8..16 {
            let p = Prefixes::from_flags(PrefixFlags::VEX, field);
            assert_eq!(p.vvvv_register(), field ^ 0xF);
        }
        assert_eq!(Prefixes::from_flags(PrefixFlags::VEX, 0x0).vvvv_register(), 15);
        assert_eq!(Prefixes::from_flags(PrefixFlags::VEX, 0xF).vvvv_register(), 0);
    }

    #[test]
    fn test_operand_size_precedence() {
        let os_w = Prefixes::from_flags(PrefixFlags::OPERAND_SIZE | PrefixFlags::REX_W, 0xF);
        assert_eq!(os_w.operand_size(OperandDefault::Bits32), 16);

        let w = Prefixes::from_flags(PrefixFlags::REX | PrefixFlags::REX_W, 0xF);
        assert_eq!(w.operand_size(OperandDefault::Bits32), 64);

        let none = Prefixes::default();
        assert_eq!(none.operand_size(OperandDefault::Bits32), 32);
        assert_eq!(none.operand_size(OperandDefault::Bits64), 64);

        let os = Prefixes::from_flags(PrefixFlags::OPERAND_SIZE, 0xF);
        assert_eq!(os.operand_size(OperandDefault::Bits64), 16);
    }
}
