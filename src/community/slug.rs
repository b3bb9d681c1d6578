/// Lowercase, accents transliterated, only `[a-z0-9]` kept.
pub fn slugify(input: &str) -> String {
    input
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_accent)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// `slug(institution) + slug(grade) + slug(division)` followed by the last
/// six digits of the millisecond timestamp. Not guaranteed unique.
pub fn community_id(institution: &str, grade: &str, division: &str, now_millis: i64) -> String {
    format!(
        "{}{}{}{:06}",
        slugify(institution),
        slugify(grade),
        slugify(division),
        now_millis.rem_euclid(1_000_000)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents_spaces_and_punctuation() {
        assert_eq!(slugify("Escuela San Martín"), "escuelasanmartin");
        assert_eq!(slugify("3er. Grado"), "3ergrado");
        assert_eq!(slugify("Ñandú – Jardín Nº 5"), "nandujardinn5");
    }

    #[test]
    fn community_id_appends_six_timestamp_digits() {
        let id = community_id("Escuela San Martín", "3er. Grado", "A", 1_760_000_123_456);
        assert_eq!(id, "escuelasanmartin3ergradoa123456");

        let padded = community_id("Colegio", "1", "B", 1_000_000_000_042);
        assert_eq!(padded, "colegio1b000042");
    }
}
