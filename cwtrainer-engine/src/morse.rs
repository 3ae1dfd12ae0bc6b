//! International Morse code table.

/// A single keyed element of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Dit,
    Dah,
}

/// Dot/dash pattern for a character, e.g. `"-.-"` for `K`.
/// Letters are case-insensitive. Returns `None` for unsupported characters.
pub fn pattern(c: char) -> Option<&'static str> {
    let code = match c.to_ascii_uppercase() {
        'A' => ".-",
        'B' => "-...",
        'C' => "-.-.",
        'D' => "-..",
        'E' => ".",
        'F' => "..-.",
        'G' => "--.",
        'H' => "....",
        'I' => "..",
        'J' => ".---",
        'K' => "-.-",
        'L' => ".-..",
        'M' => "--",
        'N' => "-.",
        'O' => "---",
        'P' => ".--.",
        'Q' => "--.-",
        'R' => ".-.",
        'S' => "...",
        'T' => "-",
        'U' => "..-",
        'V' => "...-",
        'W' => ".--",
        'X' => "-..-",
        'Y' => "-.--",
        'Z' => "--..",
        '0' => "-----",
        '1' => ".----",
        '2' => "..---",
        '3' => "...--",
        '4' => "....-",
        '5' => ".....",
        '6' => "-....",
        '7' => "--...",
        '8' => "---..",
        '9' => "----.",
        '.' => ".-.-.-",
        ',' => "--..--",
        '?' => "..--..",
        '/' => "-..-.",
        '=' => "-...-",
        '+' => ".-.-.",
        '-' => "-....-",
        '\'' => ".----.",
        '!' => "-.-.--",
        '(' => "-.--.",
        ')' => "-.--.-",
        '&' => ".-...",
        ':' => "---...",
        ';' => "-.-.-.",
        '"' => ".-..-.",
        '@' => ".--.-.",
        _ => return None,
    };
    Some(code)
}

/// Elements of a character in keying order.
pub fn elements(c: char) -> Option<impl Iterator<Item = Element>> {
    pattern(c).map(|code| {
        code.chars().map(|symbol| match symbol {
            '-' => Element::Dah,
            _ => Element::Dit,
        })
    })
}
