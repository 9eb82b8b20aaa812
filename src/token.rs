//! The static token table and the character→token map.
//!
//! Token numbers double as bytecode opcodes, so their values are part of
//! the compiled-function format and must stay stable.

use std::collections::HashMap;
use std::sync::LazyLock;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const CHAR_HIGH_MINUS: u32 = 0x00AF; // ¯
pub const CHAR_DELTA: u32 = 0x2206; // ∆

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TokFlags: u8 {
        const ATOM    = 1;
        const MONADIC = 2;
        const DYADIC  = 4;
        const OPER    = 16;
        const LDEL    = 32;
    }
}

impl TokFlags {
    const BIADIC: TokFlags = TokFlags::MONADIC.union(TokFlags::DYADIC);
    const NONE: TokFlags = TokFlags::empty();
}

/// One APL token. The discriminant is the bytecode opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Tok {
    End = 0,
    Num = 1,
    Chr = 2,
    Arr = 3,
    Str = 4,
    VarNam = 5,
    VarInx = 6,
    VarSys = 7,
    SysFun1 = 8,
    SysFun2 = 9,
    Nl = 12,
    Epsilon = 15,
    Iota = 16,
    Rho = 17,
    UpStile = 18,
    DownStile = 19,
    LeftArrow = 20,
    UpArrow = 21,
    RightArrow = 22,
    DownArrow = 23,
    Circle = 24,
    UpTack = 25,
    DownTack = 26,
    GradeUp = 27,
    GradeDown = 28,
    Hydrant = 29,
    Thorn = 30,
    SlashBar = 31,
    BackslashBar = 32,
    ExclMark = 33,
    CircleStile = 34,
    CircleBar = 35,
    Transpose = 36,
    Quad = 37,
    QuoteQuad = 38,
    Domino = 39,
    LeftParen = 40,
    RightParen = 41,
    Star = 42,
    Plus = 43,
    Comma = 44,
    Minus = 45,
    Dot = 46,
    Slash = 47,
    LessOrEqual = 48,
    NotEqual = 49,
    GreaterOrEqual = 50,
    And = 51,
    Or = 52,
    Nand = 53,
    Nor = 54,
    Times = 55,
    Div = 56,
    CircleStar = 57,
    Colon = 58,
    Semicolon = 59,
    LessThan = 60,
    Equal = 61,
    GreaterThan = 62,
    QuestionMark = 63,
    At = 64,
    LeftBracket = 65,
    Backslash = 66,
    RightBracket = 67,
    Stile = 68,
    Tilde = 69,
    Del = 70,
    Lamp = 71,
    Diamond = 72,
    Jot = 73,
    Alpha = 74,
    Omega = 75,
    Delta = 76,
    CommaBar = 77,
}

pub const NUM_TOKENS: usize = 78;

#[derive(Debug, Clone, Copy)]
pub struct TokenInfo {
    /// Primary Unicode code point, 0 for internal tokens.
    pub code: u32,
    pub flags: TokFlags,
    /// Keyboard prefix character for editor input aids.
    pub prefix: u8,
}

const fn t(code: u32, flags: TokFlags, prefix: u8) -> TokenInfo {
    TokenInfo { code, flags, prefix }
}

#[rustfmt::skip]
static TOKENS: [TokenInfo; NUM_TOKENS] = [
    t(0,      TokFlags::NONE,    0),     // End
    t(0,      TokFlags::ATOM,    0),     // Num
    t(0,      TokFlags::ATOM,    0),     // Chr
    t(0,      TokFlags::ATOM,    0),     // Arr
    t(0,      TokFlags::ATOM,    0),     // Str
    t(0,      TokFlags::ATOM,    0),     // VarNam
    t(0,      TokFlags::ATOM,    0),     // VarInx
    t(0,      TokFlags::ATOM,    0),     // VarSys
    t(0,      TokFlags::MONADIC, 0),     // SysFun1
    t(0,      TokFlags::DYADIC,  0),     // SysFun2
    t(0,      TokFlags::NONE,    0),     // available
    t(0,      TokFlags::NONE,    0),     // available
    t(0,      TokFlags::LDEL,    0),     // Nl
    t(0,      TokFlags::NONE,    0),     // available
    t(0,      TokFlags::NONE,    0),     // available
    t(0x220A, TokFlags::DYADIC,  b'e'),  // ∊
    t(0x2373, TokFlags::BIADIC,  b'i'),  // ⍳
    t(0x2374, TokFlags::BIADIC,  b'r'),  // ⍴
    t(0x2308, TokFlags::BIADIC,  b's'),  // ⌈
    t(0x230A, TokFlags::BIADIC,  b'd'),  // ⌊
    t(0x2190, TokFlags::DYADIC,  b'['),  // ←
    t(0x2191, TokFlags::DYADIC,  b'y'),  // ↑
    t(0x2192, TokFlags::LDEL,    b']'),  // →
    t(0x2193, TokFlags::DYADIC,  b'u'),  // ↓
    t(0x25CB, TokFlags::BIADIC,  b'o'),  // ○
    t(0x22A5, TokFlags::DYADIC,  b'b'),  // ⊥
    t(0x22A4, TokFlags::DYADIC,  b'n'),  // ⊤
    t(0x234B, TokFlags::MONADIC, b'$'),  // ⍋
    t(0x2352, TokFlags::MONADIC, b'#'),  // ⍒
    t(0x234E, TokFlags::MONADIC, b';'),  // ⍎
    t(0x2355, TokFlags::BIADIC,  b'\''), // ⍕
    t(0x233F, TokFlags::DYADIC,  b'/'),  // ⌿
    t(0x2340, TokFlags::DYADIC,  b'.'),  // ⍀
    t(0x0021, TokFlags::BIADIC,  0),     // !
    t(0x233D, TokFlags::BIADIC,  b'%'),  // ⌽
    t(0x2296, TokFlags::BIADIC,  b'&'),  // ⊖
    t(0x2349, TokFlags::BIADIC,  b'^'),  // ⍉
    t(0x2395, TokFlags::ATOM,    b'l'),  // ⎕
    t(0x235E, TokFlags::ATOM,    b'{'),  // ⍞
    t(0x2339, TokFlags::BIADIC,  b'+'),  // ⌹
    t(0x0028, TokFlags::LDEL,    0),     // (
    t(0x0029, TokFlags::ATOM,    0),     // )
    t(0x002A, TokFlags::BIADIC,  0),     // *
    t(0x002B, TokFlags::BIADIC,  0),     // +
    t(0x002C, TokFlags::BIADIC,  0),     // ,
    t(0x002D, TokFlags::BIADIC,  0),     // -
    t(0x002E, TokFlags::OPER,    0),     // .
    t(0x002F, TokFlags::DYADIC,  0),     // /
    t(0x2264, TokFlags::DYADIC,  b'4'),  // ≤
    t(0x2260, TokFlags::DYADIC,  b'8'),  // ≠
    t(0x2265, TokFlags::DYADIC,  b'6'),  // ≥
    t(0x2227, TokFlags::DYADIC,  b'0'),  // ∧
    t(0x2228, TokFlags::DYADIC,  b'9'),  // ∨
    t(0x2372, TokFlags::DYADIC,  b')'),  // ⍲
    t(0x2371, TokFlags::DYADIC,  b'('),  // ⍱
    t(0x00D7, TokFlags::BIADIC,  b'-'),  // ×
    t(0x00F7, TokFlags::BIADIC,  b'='),  // ÷
    t(0x235F, TokFlags::BIADIC,  b'*'),  // ⍟
    t(0x003A, TokFlags::NONE,    0),     // :
    t(0x003B, TokFlags::LDEL,    0),     // ;
    t(0x003C, TokFlags::DYADIC,  0),     // <
    t(0x003D, TokFlags::DYADIC,  0),     // =
    t(0x003E, TokFlags::DYADIC,  0),     // >
    t(0x003F, TokFlags::BIADIC,  0),     // ?
    t(0x0040, TokFlags::NONE,    0),     // @
    t(0x005B, TokFlags::LDEL,    0),     // [
    t(0x005C, TokFlags::DYADIC,  0),     // backslash
    t(0x005D, TokFlags::ATOM,    0),     // ]
    t(0x007C, TokFlags::BIADIC,  0),     // |
    t(0x007E, TokFlags::MONADIC, 0),     // ~
    t(0x2207, TokFlags::NONE,    b'g'),  // ∇
    t(0x235D, TokFlags::NONE,    b','),  // ⍝
    t(0x22C4, TokFlags::LDEL,    b'`'),  // ⋄
    t(0x2218, TokFlags::OPER,    b'j'),  // ∘
    t(0x2379, TokFlags::NONE,    b'a'),  // ⍺
    t(0x2375, TokFlags::NONE,    b'w'),  // ⍵
    t(0x2206, TokFlags::NONE,    b'h'),  // ∆
    t(0x236A, TokFlags::DYADIC,  b'<'),  // ⍪
];

/// Alternate code points accepted for a token (e.g. `^` for "and").
static ALT_CHARS: [(u32, Tok); 6] = [
    (0x22C6, Tok::Star),
    (0x2223, Tok::Stile),
    (0x23A2, Tok::Stile),
    (0x223C, Tok::Tilde),
    (0x005E, Tok::And),
    (0x2212, Tok::Minus),
];

static CHAR_MAP: LazyLock<HashMap<u32, Tok>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for id in 0..NUM_TOKENS {
        let info = &TOKENS[id];
        if info.code != 0 {
            let tok = Tok::try_from(id as u8).expect("token table entry without a token");
            map.insert(info.code, tok);
        }
    }
    for &(code, tok) in &ALT_CHARS {
        map.insert(code, tok);
    }
    map
});

impl Tok {
    pub fn info(self) -> &'static TokenInfo {
        &TOKENS[u8::from(self) as usize]
    }

    /// Token for a Unicode code point, if any.
    pub fn from_char(code: u32) -> Option<Tok> {
        CHAR_MAP.get(&code).copied()
    }

    pub fn is_atom(self) -> bool {
        self.info().flags.contains(TokFlags::ATOM)
    }

    pub fn is_monadic(self) -> bool {
        self.info().flags.contains(TokFlags::MONADIC)
    }

    pub fn is_dyadic(self) -> bool {
        self.info().flags.contains(TokFlags::DYADIC)
    }

    /// Tokens that terminate an expression.
    pub fn is_end(self) -> bool {
        self == Tok::End || self.info().flags.contains(TokFlags::LDEL)
    }

    pub fn is_token(self) -> bool {
        !self.info().flags.is_empty()
    }

    /// The display glyph, for code listings and diagnostics.
    pub fn glyph(self) -> Option<char> {
        char::from_u32(self.info().code).filter(|_| self.info().code != 0)
    }
}

/// System variable / function indices (the byte operand of `VarSys` and
/// `SysFun1` bytecodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SysName {
    Alphabet = 1,
    CompTol = 2,
    Digits = 3,
    Ident = 4,
    Origin = 5,
    PrintPrec = 6,
    Rref = 7,
    Version = 8,
    Wsid = 9,
    Timestamp = 10,
    Debug = 11,
    Pid = 12,
    Lu = 13,
}

/// Quad names, resolved case-insensitively after a `⎕` prefix.
static SYS_NAMES: [(&str, Tok, SysName); 13] = [
    ("a", Tok::VarSys, SysName::Alphabet),
    ("ct", Tok::VarSys, SysName::CompTol),
    ("d", Tok::VarSys, SysName::Digits),
    ("dbg", Tok::VarSys, SysName::Debug),
    ("ident", Tok::SysFun1, SysName::Ident),
    ("io", Tok::VarSys, SysName::Origin),
    ("lu", Tok::SysFun1, SysName::Lu),
    ("pid", Tok::VarSys, SysName::Pid),
    ("pp", Tok::VarSys, SysName::PrintPrec),
    ("rref", Tok::SysFun1, SysName::Rref),
    ("ts", Tok::VarSys, SysName::Timestamp),
    ("ver", Tok::VarSys, SysName::Version),
    ("wsid", Tok::VarSys, SysName::Wsid),
];

pub fn lookup_sys_name(name: &str) -> Option<(Tok, SysName)> {
    SYS_NAMES
        .iter()
        .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, tok, idx)| (tok, idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyphs_resolve_to_their_token() {
        assert_eq!(Tok::from_char('⍳' as u32), Some(Tok::Iota));
        assert_eq!(Tok::from_char('⍴' as u32), Some(Tok::Rho));
        assert_eq!(Tok::from_char('+' as u32), Some(Tok::Plus));
        assert_eq!(Tok::from_char('⋄' as u32), Some(Tok::Diamond));
        assert_eq!(Tok::from_char('q' as u32), None);
    }

    #[test]
    fn alternates_map_to_primaries() {
        assert_eq!(Tok::from_char('^' as u32), Some(Tok::And));
        assert_eq!(Tok::from_char(0x22C6), Some(Tok::Star));
        assert_eq!(Tok::from_char(0x2223), Some(Tok::Stile));
    }

    #[test]
    fn attribute_predicates() {
        assert!(Tok::Iota.is_monadic() && Tok::Iota.is_dyadic());
        assert!(Tok::Epsilon.is_dyadic() && !Tok::Epsilon.is_monadic());
        assert!(Tok::Num.is_atom());
        assert!(Tok::Diamond.is_end());
        assert!(Tok::RightArrow.is_end());
        assert!(Tok::End.is_end());
        assert!(!Tok::Colon.is_token());
    }

    #[test]
    fn sys_names_are_case_insensitive() {
        assert_eq!(lookup_sys_name("IO"), Some((Tok::VarSys, SysName::Origin)));
        assert_eq!(lookup_sys_name("pp"), Some((Tok::VarSys, SysName::PrintPrec)));
        assert_eq!(lookup_sys_name("Rref"), Some((Tok::SysFun1, SysName::Rref)));
        assert_eq!(lookup_sys_name("nope"), None);
    }
}
