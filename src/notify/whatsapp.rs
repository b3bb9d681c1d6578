use url::Url;

use super::email::format_amount;
use crate::community::models::{ActiveEvent, Community, Contributor};

const WHATSAPP_SEND: &str = "https://api.whatsapp.com/send";

/// Pre-filled chat link. The phone is reduced to its digits; `None` when
/// nothing is left.
pub fn whatsapp_link(phone: &str, text: &str) -> Option<Url> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Url::parse_with_params(WHATSAPP_SEND, &[("phone", digits.as_str()), ("text", text)]).ok()
}

pub fn reminder_text(contributor: &Contributor, event: &ActiveEvent, community: &Community) -> String {
    let mut text = format!(
        "¡Hola {}! Te recordamos el aporte de {} para el regalo de {} ({}), que cumple el {}.",
        contributor.parent_name,
        format_amount(contributor.amount),
        event.child_name,
        community.name,
        event.event_date.format("%d/%m/%Y"),
    );
    if let Some(alias) = community.creator_alias.as_deref() {
        text.push_str(&format!(" Alias: {alias}."));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{active_event, community, contributor};

    #[test]
    fn link_keeps_only_phone_digits_and_encodes_text() {
        let url = whatsapp_link("+54 9 11 4444-0000", "hola & chau").unwrap();
        assert_eq!(url.host_str(), Some("api.whatsapp.com"));
        assert_eq!(url.path(), "/send");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("phone".into(), "5491144440000".into()));
        assert_eq!(pairs[1], ("text".into(), "hola & chau".into()));
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn phones_without_digits_have_no_link() {
        assert!(whatsapp_link("sin número", "hola").is_none());
        assert!(whatsapp_link("", "hola").is_none());
    }

    #[test]
    fn reminder_text_mentions_amount_and_alias() {
        let text = reminder_text(
            &contributor("c1", "ae1", None, 500.0),
            &active_event("ae1", "k1", 1000.0),
            &community("k1"),
        );
        assert!(text.starts_with("¡Hola Parent c1!"));
        assert!(text.contains("$500"));
        assert!(text.contains("Alias: marta.mp."));
    }
}
