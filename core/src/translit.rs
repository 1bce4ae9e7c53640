//! Cyrillic to Latin transliteration for spoken labels.
//!
//! Covers Russian and Ukrainian letters. Voices trained on Latin-script
//! languages read the result far better than the raw Cyrillic name.

/// Latin rendering of a lowercase Cyrillic letter, if it has one.
fn latin_for(lower: char) -> Option<&'static str> {
    let s = match lower {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'ґ' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "yo",
        'є' => "ye",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'і' => "i",
        'ї' => "yi",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' => "",
        'ы' => "y",
        'ь' => "",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        _ => return None,
    };
    Some(s)
}

/// Transliterate every Cyrillic letter of `text`; anything else is copied as is.
///
/// Upper-case letters keep their case on the first Latin letter only, so
/// "Щука" becomes "Shchuka" rather than "SHCHuka".
pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let lower = ch.to_lowercase().next().unwrap_or(ch);
        match latin_for(lower) {
            Some(latin) if lower != ch => {
                let mut chars = latin.chars();
                if let Some(first) = chars.next() {
                    out.extend(first.to_uppercase());
                    out.push_str(chars.as_str());
                }
            }
            Some(latin) => out.push_str(latin),
            None => out.push(ch),
        }
    }
    out
}
