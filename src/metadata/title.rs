use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// "01 - ", "1. ", "02_", "1-03 " and similar track number prefixes.
    static ref TRACK_NUMBER_PREFIX: Regex =
        Regex::new(r"^\s*(?:\d{1,2}\s*[-.]\s*)?\d{1,3}(?:\s*[-._)\]]+\s*|\s+)").unwrap();
    /// Leading separators left behind once the number is gone.
    static ref LEADING_SEPARATORS: Regex = Regex::new(r"^[\s\-._]+").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Best-effort title for a file without a title tag.
pub fn title_from_file_name(file_name: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    let without_number = TRACK_NUMBER_PREFIX.replace(stem, "");
    let without_separators = LEADING_SEPARATORS.replace(&without_number, "");
    let spaced = without_separators.replace('_', " ");
    let title = WHITESPACE.replace_all(spaced.trim(), " ").into_owned();
    if title.is_empty() {
        stem.trim().to_string()
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_extension_and_track_numbers() {
        assert_eq!(title_from_file_name("01 - Intro.mp3"), "Intro");
        assert_eq!(title_from_file_name("1. Intro.flac"), "Intro");
        assert_eq!(title_from_file_name("02_night_drive.ogg"), "night drive");
        assert_eq!(title_from_file_name("1-03 Outro.m4a"), "Outro");
        assert_eq!(title_from_file_name("Unknown.flac"), "Unknown");
    }

    #[test]
    fn keeps_numbers_that_are_part_of_the_title() {
        assert_eq!(title_from_file_name("2001 A Space Odyssey.mp3"), "2001 A Space Odyssey");
        assert_eq!(title_from_file_name("99.mp3"), "99");
        assert_eq!(title_from_file_name("07 -.mp3"), "07 -");
    }
}
