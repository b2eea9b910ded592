//! Key definitions for synthesized input.
//!
//! CDP's Input domain wants the DOM `key`, the physical `code` and the
//! legacy Windows virtual key code on every dispatch. Only the handful of
//! keys the capture flow actually presses are defined here.

/// CDP modifier bitmask values (Input.dispatchKeyEvent `modifiers`).
pub mod modifiers {
    pub const NONE: i64 = 0;
    pub const ALT: i64 = 1;
    pub const CTRL: i64 = 2;
    pub const META: i64 = 4;
    pub const SHIFT: i64 = 8;
}

/// One dispatchable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDef {
    pub key: &'static str,
    pub code: &'static str,
    pub key_code: i64,
}

/// Look up a key by its DOM `key` name.
pub fn lookup(name: &str) -> Option<KeyDef> {
    let def = match name {
        "Escape" => KeyDef {
            key: "Escape",
            code: "Escape",
            key_code: 27,
        },
        "Alt" => KeyDef {
            key: "Alt",
            code: "AltLeft",
            key_code: 18,
        },
        "F4" => KeyDef {
            key: "F4",
            code: "F4",
            key_code: 115,
        },
        "s" => KeyDef {
            key: "s",
            code: "KeyS",
            key_code: 83,
        },
        _ => return None,
    };
    Some(def)
}

/// Modifier bit carried while a held key is down, by DOM `key` name.
pub fn modifier_bit(name: &str) -> i64 {
    match name {
        "Alt" => modifiers::ALT,
        "Control" => modifiers::CTRL,
        "Meta" => modifiers::META,
        "Shift" => modifiers::SHIFT,
        _ => modifiers::NONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_keys() {
        assert_eq!(lookup("Escape").unwrap().key_code, 27);
        assert_eq!(lookup("Alt").unwrap().code, "AltLeft");
        assert_eq!(lookup("F4").unwrap().key_code, 115);
        assert_eq!(lookup("s").unwrap().code, "KeyS");
    }

    #[test]
    fn test_lookup_unknown_key() {
        assert!(lookup("Hyper").is_none());
    }

    #[test]
    fn test_modifier_bits() {
        assert_eq!(modifier_bit("Alt"), modifiers::ALT);
        assert_eq!(modifier_bit("Escape"), modifiers::NONE);
    }
}
