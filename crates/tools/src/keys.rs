//! Key-name translation and chord planning.
//!
//! Model-facing key names (xdotool style, e.g. `ctrl`, `kp_5`, `page_down`)
//! are mapped to DOM key names (`Control`, `Numpad5`, `PageDown`). Names not
//! in the table pass through unchanged.

/// Lowercase alias to DOM key name.
static KEY_ALIASES: &[(&str, &str)] = &[
    ("return", "Enter"),
    ("enter", "Enter"),
    ("tab", "Tab"),
    ("backspace", "Backspace"),
    ("up", "ArrowUp"),
    ("down", "ArrowDown"),
    ("left", "ArrowLeft"),
    ("right", "ArrowRight"),
    ("space", "Space"),
    ("ctrl", "Control"),
    ("control", "Control"),
    ("alt", "Alt"),
    ("shift", "Shift"),
    ("meta", "Meta"),
    ("command", "Meta"),
    ("windows", "Meta"),
    ("esc", "Escape"),
    ("escape", "Escape"),
    ("kp_0", "Numpad0"),
    ("kp_1", "Numpad1"),
    ("kp_2", "Numpad2"),
    ("kp_3", "Numpad3"),
    ("kp_4", "Numpad4"),
    ("kp_5", "Numpad5"),
    ("kp_6", "Numpad6"),
    ("kp_7", "Numpad7"),
    ("kp_8", "Numpad8"),
    ("kp_9", "Numpad9"),
    ("page_down", "PageDown"),
    ("page_up", "PageUp"),
    ("f1", "F1"),
    ("f2", "F2"),
    ("f3", "F3"),
    ("f4", "F4"),
    ("f5", "F5"),
    ("f6", "F6"),
    ("f7", "F7"),
    ("f8", "F8"),
    ("f9", "F9"),
    ("f10", "F10"),
    ("f11", "F11"),
    ("f12", "F12"),
    ("home", "Home"),
    ("end", "End"),
    ("insert", "Insert"),
    ("delete", "Delete"),
    ("shift_l", "ShiftLeft"),
    ("shift_r", "ShiftRight"),
    ("control_l", "ControlLeft"),
    ("control_r", "ControlRight"),
    ("alt_l", "AltLeft"),
    ("alt_r", "AltRight"),
    ("audiovolumemute", "AudioVolumeMute"),
    ("audiovolumedown", "AudioVolumeDown"),
    ("audiovolumeup", "AudioVolumeUp"),
    ("print", "PrintScreen"),
    ("scroll_lock", "ScrollLock"),
    ("pause", "Pause"),
    ("menu", "ContextMenu"),
    ("kp_enter", "NumpadEnter"),
    ("kp_multiply", "NumpadMultiply"),
    ("kp_add", "NumpadAdd"),
    ("kp_subtract", "NumpadSubtract"),
    ("kp_decimal", "NumpadDecimal"),
    ("kp_divide", "NumpadDivide"),
];

/// Translates a model-facing key name to a DOM key name (case-insensitive).
pub fn translate_key(name: &str) -> String {
    let lower = name.to_lowercase();
    KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, key)| (*key).to_string())
        .unwrap_or_else(|| name.to_string())
}

/// One step of a planned key chord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStroke {
    Down(String),
    Press(String),
    Up(String),
}

/// Plans the keystrokes for a `+`-joined chord.
///
/// Every key but the last is held down in order, the last key is pressed,
/// then the held keys are released in reverse order.
pub fn chord_plan(chord: &str) -> Vec<KeyStroke> {
    let keys: Vec<String> = split_chord(chord).into_iter().map(translate_key).collect();
    let Some((last, held)) = keys.split_last() else {
        return Vec::new();
    };

    let mut plan = Vec::with_capacity(held.len() * 2 + 1);
    plan.extend(held.iter().cloned().map(KeyStroke::Down));
    plan.push(KeyStroke::Press(last.clone()));
    plan.extend(held.iter().rev().cloned().map(KeyStroke::Up));
    plan
}

// "+" and "ctrl++" name the plus key itself.
fn split_chord(chord: &str) -> Vec<&str> {
    if let Some(prefix) = chord.strip_suffix('+')
        && (prefix.is_empty() || prefix.ends_with('+'))
    {
        let mut keys: Vec<&str> = match prefix.strip_suffix('+') {
            Some(rest) if !rest.is_empty() => rest.split('+').collect(),
            _ => Vec::new(),
        };
        keys.push("+");
        return keys;
    }
    if chord.is_empty() {
        return Vec::new();
    }
    chord.split('+').collect()
}

/// CDP parameters for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinition {
    pub key: String,
    pub code: String,
    pub key_code: i64,
    /// Text inserted on key down, for printable keys.
    pub text: Option<String>,
}

/// (DOM key name, key, code, virtual key code, text)
static KEY_DEFINITIONS: &[(&str, &str, &str, i64, Option<&str>)] = &[
    ("Enter", "Enter", "Enter", 13, Some("\r")),
    ("Tab", "Tab", "Tab", 9, None),
    ("Backspace", "Backspace", "Backspace", 8, None),
    ("ArrowUp", "ArrowUp", "ArrowUp", 38, None),
    ("ArrowDown", "ArrowDown", "ArrowDown", 40, None),
    ("ArrowLeft", "ArrowLeft", "ArrowLeft", 37, None),
    ("ArrowRight", "ArrowRight", "ArrowRight", 39, None),
    ("Space", " ", "Space", 32, Some(" ")),
    ("Control", "Control", "ControlLeft", 17, None),
    ("ControlLeft", "Control", "ControlLeft", 17, None),
    ("ControlRight", "Control", "ControlRight", 17, None),
    ("Alt", "Alt", "AltLeft", 18, None),
    ("AltLeft", "Alt", "AltLeft", 18, None),
    ("AltRight", "Alt", "AltRight", 18, None),
    ("Shift", "Shift", "ShiftLeft", 16, None),
    ("ShiftLeft", "Shift", "ShiftLeft", 16, None),
    ("ShiftRight", "Shift", "ShiftRight", 16, None),
    ("Meta", "Meta", "MetaLeft", 91, None),
    ("Escape", "Escape", "Escape", 27, None),
    ("Numpad0", "0", "Numpad0", 96, Some("0")),
    ("Numpad1", "1", "Numpad1", 97, Some("1")),
    ("Numpad2", "2", "Numpad2", 98, Some("2")),
    ("Numpad3", "3", "Numpad3", 99, Some("3")),
    ("Numpad4", "4", "Numpad4", 100, Some("4")),
    ("Numpad5", "5", "Numpad5", 101, Some("5")),
    ("Numpad6", "6", "Numpad6", 102, Some("6")),
    ("Numpad7", "7", "Numpad7", 103, Some("7")),
    ("Numpad8", "8", "Numpad8", 104, Some("8")),
    ("Numpad9", "9", "Numpad9", 105, Some("9")),
    ("NumpadEnter", "Enter", "NumpadEnter", 13, Some("\r")),
    ("NumpadMultiply", "*", "NumpadMultiply", 106, Some("*")),
    ("NumpadAdd", "+", "NumpadAdd", 107, Some("+")),
    ("NumpadSubtract", "-", "NumpadSubtract", 109, Some("-")),
    ("NumpadDecimal", ".", "NumpadDecimal", 110, Some(".")),
    ("NumpadDivide", "/", "NumpadDivide", 111, Some("/")),
    ("PageUp", "PageUp", "PageUp", 33, None),
    ("PageDown", "PageDown", "PageDown", 34, None),
    ("End", "End", "End", 35, None),
    ("Home", "Home", "Home", 36, None),
    ("Insert", "Insert", "Insert", 45, None),
    ("Delete", "Delete", "Delete", 46, None),
    ("F1", "F1", "F1", 112, None),
    ("F2", "F2", "F2", 113, None),
    ("F3", "F3", "F3", 114, None),
    ("F4", "F4", "F4", 115, None),
    ("F5", "F5", "F5", 116, None),
    ("F6", "F6", "F6", 117, None),
    ("F7", "F7", "F7", 118, None),
    ("F8", "F8", "F8", 119, None),
    ("F9", "F9", "F9", 120, None),
    ("F10", "F10", "F10", 121, None),
    ("F11", "F11", "F11", 122, None),
    ("F12", "F12", "F12", 123, None),
    ("AudioVolumeMute", "AudioVolumeMute", "AudioVolumeMute", 173, None),
    ("AudioVolumeDown", "AudioVolumeDown", "AudioVolumeDown", 174, None),
    ("AudioVolumeUp", "AudioVolumeUp", "AudioVolumeUp", 175, None),
    ("PrintScreen", "PrintScreen", "PrintScreen", 44, None),
    ("ScrollLock", "ScrollLock", "ScrollLock", 145, None),
    ("Pause", "Pause", "Pause", 19, None),
    ("ContextMenu", "ContextMenu", "ContextMenu", 93, None),
];

/// Resolves CDP parameters for a DOM key name or a single character.
pub fn key_definition(key: &str) -> KeyDefinition {
    if let Some((_, k, code, key_code, text)) =
        KEY_DEFINITIONS.iter().find(|(name, ..)| *name == key)
    {
        return KeyDefinition {
            key: (*k).to_string(),
            code: (*code).to_string(),
            key_code: *key_code,
            text: text.map(str::to_string),
        };
    }

    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => char_definition(c),
        _ => KeyDefinition {
            key: key.to_string(),
            code: String::new(),
            key_code: 0,
            text: None,
        },
    }
}

/// CDP modifier bits: Alt=1, Ctrl=2, Meta=4, Shift=8.
pub fn modifier_bit(key: &str) -> i64 {
    match key {
        "Alt" => 1,
        "Control" => 2,
        "Meta" => 4,
        "Shift" => 8,
        _ => 0,
    }
}

/// Modifiers that turn a printable key into a shortcut with no text input.
const SHORTCUT_MODIFIERS: i64 = 1 | 2 | 4;

impl KeyDefinition {
    /// Modifier mask after this key goes down or up.
    pub fn apply_to(&self, mask: i64, down: bool) -> i64 {
        let bit = modifier_bit(&self.key);
        if down { mask | bit } else { mask & !bit }
    }

    /// Text to insert on key down while `mask` is held.
    pub fn text_under(&self, mask: i64) -> Option<&str> {
        if mask & SHORTCUT_MODIFIERS != 0 {
            return None;
        }
        self.text.as_deref()
    }
}

fn char_definition(c: char) -> KeyDefinition {
    let (code, key_code) = if c.is_ascii_alphabetic() {
        let upper = c.to_ascii_uppercase();
        (format!("Key{upper}"), upper as i64)
    } else if c.is_ascii_digit() {
        (format!("Digit{c}"), c as i64)
    } else {
        (String::new(), 0)
    };
    KeyDefinition {
        key: c.to_string(),
        code,
        key_code,
        text: Some(c.to_string()),
    }
}
