//! Keyboard tables for CDP `Input.dispatchKeyEvent`.
//!
//! Special keys are encoded as Unicode private-use characters in
//! `\u{e000}`–`\u{e03d}` (the WebDriver convention), so they can travel
//! inside ordinary strings next to literal text. Four of them are
//! modifiers with bits: Alt=1, Ctrl=2, Meta=4, Shift=8.

/// Special key code points.
pub struct Keys;

#[allow(missing_docs)]
impl Keys {
    pub const NULL: char = '\u{e000}';
    pub const CANCEL: char = '\u{e001}';
    pub const HELP: char = '\u{e002}';
    pub const BACKSPACE: char = '\u{e003}';
    pub const TAB: char = '\u{e004}';
    pub const CLEAR: char = '\u{e005}';
    pub const RETURN: char = '\u{e006}';
    pub const ENTER: char = '\u{e007}';
    pub const SHIFT: char = '\u{e008}';
    pub const CONTROL: char = '\u{e009}';
    pub const ALT: char = '\u{e00a}';
    pub const PAUSE: char = '\u{e00b}';
    pub const ESCAPE: char = '\u{e00c}';
    pub const SPACE: char = '\u{e00d}';
    pub const PAGE_UP: char = '\u{e00e}';
    pub const PAGE_DOWN: char = '\u{e00f}';
    pub const END: char = '\u{e010}';
    pub const HOME: char = '\u{e011}';
    pub const LEFT: char = '\u{e012}';
    pub const UP: char = '\u{e013}';
    pub const RIGHT: char = '\u{e014}';
    pub const DOWN: char = '\u{e015}';
    pub const INSERT: char = '\u{e016}';
    pub const DELETE: char = '\u{e017}';
    pub const SEMICOLON: char = '\u{e018}';
    pub const EQUALS: char = '\u{e019}';
    pub const NUMPAD0: char = '\u{e01a}';
    pub const NUMPAD1: char = '\u{e01b}';
    pub const NUMPAD2: char = '\u{e01c}';
    pub const NUMPAD3: char = '\u{e01d}';
    pub const NUMPAD4: char = '\u{e01e}';
    pub const NUMPAD5: char = '\u{e01f}';
    pub const NUMPAD6: char = '\u{e020}';
    pub const NUMPAD7: char = '\u{e021}';
    pub const NUMPAD8: char = '\u{e022}';
    pub const NUMPAD9: char = '\u{e023}';
    pub const MULTIPLY: char = '\u{e024}';
    pub const ADD: char = '\u{e025}';
    pub const SEPARATOR: char = '\u{e026}';
    pub const SUBTRACT: char = '\u{e027}';
    pub const DECIMAL: char = '\u{e028}';
    pub const DIVIDE: char = '\u{e029}';
    pub const F1: char = '\u{e031}';
    pub const F2: char = '\u{e032}';
    pub const F3: char = '\u{e033}';
    pub const F4: char = '\u{e034}';
    pub const F5: char = '\u{e035}';
    pub const F6: char = '\u{e036}';
    pub const F7: char = '\u{e037}';
    pub const F8: char = '\u{e038}';
    pub const F9: char = '\u{e039}';
    pub const F10: char = '\u{e03a}';
    pub const F11: char = '\u{e03b}';
    pub const F12: char = '\u{e03c}';
    pub const META: char = '\u{e03d}';
    pub const COMMAND: char = '\u{e03d}';
}

pub const MODIFIER_ALT: u32 = 1;
pub const MODIFIER_CTRL: u32 = 2;
pub const MODIFIER_META: u32 = 4;
pub const MODIFIER_SHIFT: u32 = 8;

/// Dispatch payload for one key, as CDP wants it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    /// `windowsVirtualKeyCode`.
    pub key_code: u32,
    /// Physical key, e.g. `KeyA`, `Digit1`, `Enter`.
    pub code: &'static str,
    /// Logical key value, e.g. `a`, `Enter`.
    pub key: String,
    /// Generated text, empty for non-printing keys.
    pub text: String,
    /// 0 standard, 1 left, 2 right, 3 numpad.
    pub location: u32,
}

/// Modifier bit for a key, if it is one of the four modifiers.
pub fn modifier_bit(ch: char) -> Option<u32> {
    match ch {
        Keys::ALT => Some(MODIFIER_ALT),
        Keys::CONTROL => Some(MODIFIER_CTRL),
        Keys::META => Some(MODIFIER_META),
        Keys::SHIFT => Some(MODIFIER_SHIFT),
        _ => None,
    }
}

pub fn is_modifier(ch: char) -> bool {
    modifier_bit(ch).is_some()
}

/// Fold a key sequence into `(modifier_bitmap, remaining_text)`.
///
/// Each modifier key toggles its bit (XOR), so pressing and releasing
/// the same modifier restores 0. Non-modifier keys are collected in
/// order; `Keys::NULL` clears the bitmap.
pub fn keys_to_typing(sequence: impl IntoIterator<Item = char>) -> (u32, String) {
    let mut modifiers = 0u32;
    let mut text = String::new();
    for ch in sequence {
        if ch == Keys::NULL {
            modifiers = 0;
        } else if let Some(bit) = modifier_bit(ch) {
            modifiers ^= bit;
        } else {
            text.push(ch);
        }
    }
    (modifiers, text)
}

/// Build the dispatch payload for `key` while `modifiers` are held.
/// With any non-Shift modifier active, `text` is blanked so Ctrl+A
/// sends a command rather than inserting the letter.
pub fn description_for(modifiers: u32, ch: char) -> KeyDescription {
    let mut desc = base_description(ch);
    if modifiers & (MODIFIER_ALT | MODIFIER_CTRL | MODIFIER_META) != 0 {
        desc.text = String::new();
    }
    desc
}

fn printable(key_code: u32, code: &'static str, ch: char) -> KeyDescription {
    KeyDescription {
        key_code,
        code,
        key: ch.to_string(),
        text: ch.to_string(),
        location: 0,
    }
}

fn named(key_code: u32, code: &'static str, key: &str, text: &str) -> KeyDescription {
    KeyDescription {
        key_code,
        code,
        key: key.to_string(),
        text: text.to_string(),
        location: 0,
    }
}

fn at_location(mut desc: KeyDescription, location: u32) -> KeyDescription {
    desc.location = location;
    desc
}

fn base_description(ch: char) -> KeyDescription {
    // Letters: base key code is the uppercase letter.
    if ch.is_ascii_lowercase() {
        let code = LETTER_CODES[(ch as u8 - b'a') as usize];
        return printable(ch.to_ascii_uppercase() as u32, code, ch);
    }
    if ch.is_ascii_uppercase() {
        let code = LETTER_CODES[(ch as u8 - b'A') as usize];
        return printable(ch as u32, code, ch);
    }
    if ch.is_ascii_digit() {
        let code = DIGIT_CODES[(ch as u8 - b'0') as usize];
        return printable(ch as u32, code, ch);
    }

    match ch {
        ' ' => printable(32, "Space", ' '),
        ';' => printable(186, "Semicolon", ';'),
        ':' => printable(186, "Semicolon", ':'),
        '=' => printable(187, "Equal", '='),
        '+' => printable(187, "Equal", '+'),
        ',' => printable(188, "Comma", ','),
        '<' => printable(188, "Comma", '<'),
        '-' => printable(189, "Minus", '-'),
        '_' => printable(189, "Minus", '_'),
        '.' => printable(190, "Period", '.'),
        '>' => printable(190, "Period", '>'),
        '/' => printable(191, "Slash", '/'),
        '?' => printable(191, "Slash", '?'),
        '`' => printable(192, "Backquote", '`'),
        '~' => printable(192, "Backquote", '~'),
        '[' => printable(219, "BracketLeft", '['),
        '{' => printable(219, "BracketLeft", '{'),
        '\\' => printable(220, "Backslash", '\\'),
        '|' => printable(220, "Backslash", '|'),
        ']' => printable(221, "BracketRight", ']'),
        '}' => printable(221, "BracketRight", '}'),
        '\'' => printable(222, "Quote", '\''),
        '"' => printable(222, "Quote", '"'),
        '!' => printable(49, "Digit1", '!'),
        '@' => printable(50, "Digit2", '@'),
        '#' => printable(51, "Digit3", '#'),
        '$' => printable(52, "Digit4", '$'),
        '%' => printable(53, "Digit5", '%'),
        '^' => printable(54, "Digit6", '^'),
        '&' => printable(55, "Digit7", '&'),
        '*' => printable(56, "Digit8", '*'),
        '(' => printable(57, "Digit9", '('),
        ')' => printable(48, "Digit0", ')'),
        '\n' | '\r' => named(13, "Enter", "Enter", "\r"),
        '\t' => named(9, "Tab", "Tab", "\t"),

        Keys::NULL | Keys::CANCEL => named(0, "", "Cancel", ""),
        Keys::HELP => named(47, "Help", "Help", ""),
        Keys::BACKSPACE => named(8, "Backspace", "Backspace", ""),
        Keys::TAB => named(9, "Tab", "Tab", "\t"),
        Keys::CLEAR => named(12, "Clear", "Clear", ""),
        Keys::RETURN | Keys::ENTER => named(13, "Enter", "Enter", "\r"),
        Keys::SHIFT => at_location(named(16, "ShiftLeft", "Shift", ""), 1),
        Keys::CONTROL => at_location(named(17, "ControlLeft", "Control", ""), 1),
        Keys::ALT => at_location(named(18, "AltLeft", "Alt", ""), 1),
        Keys::PAUSE => named(19, "Pause", "Pause", ""),
        Keys::ESCAPE => named(27, "Escape", "Escape", ""),
        Keys::SPACE => named(32, "Space", " ", " "),
        Keys::PAGE_UP => named(33, "PageUp", "PageUp", ""),
        Keys::PAGE_DOWN => named(34, "PageDown", "PageDown", ""),
        Keys::END => named(35, "End", "End", ""),
        Keys::HOME => named(36, "Home", "Home", ""),
        Keys::LEFT => named(37, "ArrowLeft", "ArrowLeft", ""),
        Keys::UP => named(38, "ArrowUp", "ArrowUp", ""),
        Keys::RIGHT => named(39, "ArrowRight", "ArrowRight", ""),
        Keys::DOWN => named(40, "ArrowDown", "ArrowDown", ""),
        Keys::INSERT => named(45, "Insert", "Insert", ""),
        Keys::DELETE => named(46, "Delete", "Delete", ""),
        Keys::SEMICOLON => named(186, "Semicolon", ";", ";"),
        Keys::EQUALS => named(187, "Equal", "=", "="),
        Keys::NUMPAD0 => at_location(named(96, "Numpad0", "0", "0"), 3),
        Keys::NUMPAD1 => at_location(named(97, "Numpad1", "1", "1"), 3),
        Keys::NUMPAD2 => at_location(named(98, "Numpad2", "2", "2"), 3),
        Keys::NUMPAD3 => at_location(named(99, "Numpad3", "3", "3"), 3),
        Keys::NUMPAD4 => at_location(named(100, "Numpad4", "4", "4"), 3),
        Keys::NUMPAD5 => at_location(named(101, "Numpad5", "5", "5"), 3),
        Keys::NUMPAD6 => at_location(named(102, "Numpad6", "6", "6"), 3),
        Keys::NUMPAD7 => at_location(named(103, "Numpad7", "7", "7"), 3),
        Keys::NUMPAD8 => at_location(named(104, "Numpad8", "8", "8"), 3),
        Keys::NUMPAD9 => at_location(named(105, "Numpad9", "9", "9"), 3),
        Keys::MULTIPLY => at_location(named(106, "NumpadMultiply", "*", "*"), 3),
        Keys::ADD => at_location(named(107, "NumpadAdd", "+", "+"), 3),
        Keys::SEPARATOR => at_location(named(108, "NumpadComma", ",", ","), 3),
        Keys::SUBTRACT => at_location(named(109, "NumpadSubtract", "-", "-"), 3),
        Keys::DECIMAL => at_location(named(110, "NumpadDecimal", ".", "."), 3),
        Keys::DIVIDE => at_location(named(111, "NumpadDivide", "/", "/"), 3),
        Keys::F1 => named(112, "F1", "F1", ""),
        Keys::F2 => named(113, "F2", "F2", ""),
        Keys::F3 => named(114, "F3", "F3", ""),
        Keys::F4 => named(115, "F4", "F4", ""),
        Keys::F5 => named(116, "F5", "F5", ""),
        Keys::F6 => named(117, "F6", "F6", ""),
        Keys::F7 => named(118, "F7", "F7", ""),
        Keys::F8 => named(119, "F8", "F8", ""),
        Keys::F9 => named(120, "F9", "F9", ""),
        Keys::F10 => named(121, "F10", "F10", ""),
        Keys::F11 => named(122, "F11", "F11", ""),
        Keys::F12 => named(123, "F12", "F12", ""),
        Keys::META => at_location(named(91, "MetaLeft", "Meta", ""), 1),

        // Any other character: dispatch as literal text with no key code.
        other => KeyDescription {
            key_code: 0,
            code: "",
            key: other.to_string(),
            text: other.to_string(),
            location: 0,
        },
    }
}

const LETTER_CODES: [&str; 26] = [
    "KeyA", "KeyB", "KeyC", "KeyD", "KeyE", "KeyF", "KeyG", "KeyH", "KeyI", "KeyJ", "KeyK",
    "KeyL", "KeyM", "KeyN", "KeyO", "KeyP", "KeyQ", "KeyR", "KeyS", "KeyT", "KeyU", "KeyV",
    "KeyW", "KeyX", "KeyY", "KeyZ",
];

const DIGIT_CODES: [&str; 10] = [
    "Digit0", "Digit1", "Digit2", "Digit3", "Digit4", "Digit5", "Digit6", "Digit7", "Digit8",
    "Digit9",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_bits() {
        assert_eq!(modifier_bit(Keys::ALT), Some(1));
        assert_eq!(modifier_bit(Keys::CONTROL), Some(2));
        assert_eq!(modifier_bit(Keys::META), Some(4));
        assert_eq!(modifier_bit(Keys::SHIFT), Some(8));
        assert_eq!(modifier_bit('a'), None);
    }

    #[test]
    fn typing_folds_modifiers() {
        let (mods, text) = keys_to_typing([Keys::CONTROL, 'a'].into_iter());
        assert_eq!(mods, MODIFIER_CTRL);
        assert_eq!(text, "a");

        let (mods, text) = keys_to_typing([Keys::CONTROL, Keys::SHIFT, 'x', 'y'].into_iter());
        assert_eq!(mods, MODIFIER_CTRL | MODIFIER_SHIFT);
        assert_eq!(text, "xy");
    }

    #[test]
    fn pressing_modifier_twice_restores_zero() {
        // XOR law: a pure modifier sequence equals the XOR of its bits.
        let (mods, text) = keys_to_typing([Keys::SHIFT, Keys::SHIFT].into_iter());
        assert_eq!(mods, 0);
        assert!(text.is_empty());

        let (mods, _) =
            keys_to_typing([Keys::CONTROL, Keys::ALT, Keys::CONTROL].into_iter());
        assert_eq!(mods, MODIFIER_ALT);
    }

    #[test]
    fn null_clears_modifiers() {
        let (mods, _) = keys_to_typing([Keys::CONTROL, Keys::NULL, 'a'].into_iter());
        assert_eq!(mods, 0);
    }

    #[test]
    fn ctrl_blanks_text() {
        let desc = description_for(MODIFIER_CTRL, 'a');
        assert_eq!(desc.code, "KeyA");
        assert_eq!(desc.key_code, 65);
        assert!(desc.text.is_empty());

        // Shift alone keeps the text.
        let desc = description_for(MODIFIER_SHIFT, 'a');
        assert_eq!(desc.text, "a");
    }

    #[test]
    fn modifiers_interleave_with_text() {
        // Shift down, two letters, shift up, one more letter: the
        // final bitmap is 0 but the letters all survive in order.
        let (mods, text) =
            keys_to_typing([Keys::SHIFT, 'a', 'b', Keys::SHIFT, 'c'].into_iter());
        assert_eq!(mods, 0);
        assert_eq!(text, "abc");
    }

    #[test]
    fn punctuation_shares_physical_keys() {
        assert_eq!(description_for(0, ';').code, "Semicolon");
        assert_eq!(description_for(0, ':').code, "Semicolon");
        assert_eq!(description_for(0, '[').key_code, 219);
        assert_eq!(description_for(0, '{').key_code, 219);
    }

    #[test]
    fn enter_and_tab_generate_text() {
        let enter = description_for(0, Keys::ENTER);
        assert_eq!(enter.key_code, 13);
        assert_eq!(enter.text, "\r");

        let newline = description_for(0, '\n');
        assert_eq!(newline.key_code, 13);
        assert_eq!(newline.code, "Enter");

        let tab = description_for(0, Keys::TAB);
        assert_eq!(tab.text, "\t");
    }

    #[test]
    fn digits_and_shifted_symbols_share_codes() {
        assert_eq!(description_for(0, '1').code, "Digit1");
        assert_eq!(description_for(0, '!').code, "Digit1");
        assert_eq!(description_for(0, '!').key_code, 49);
    }

    #[test]
    fn numpad_keys_carry_location() {
        let five = description_for(0, Keys::NUMPAD5);
        assert_eq!(five.location, 3);
        assert_eq!(five.key_code, 101);
    }
}
