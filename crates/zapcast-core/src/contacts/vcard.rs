//! vCard contact lists (exported phone address books)

use super::parser::ParsedContact;
use zapcast_common::phone::{digit_count, MIN_PHONE_DIGITS};

/// Read every `BEGIN:VCARD` .. `END:VCARD` block. Cards without a
/// plausible `TEL` are skipped.
pub(super) fn parse_cards(content: &str, country_code: &str) -> Vec<ParsedContact> {
    let mut contacts = Vec::new();
    let mut card: Option<Card> = None;

    for line in unfold(content) {
        let Some((property, value)) = line.split_once(':') else {
            continue;
        };
        let name = property_name(property);
        let value = value.trim();

        match name.as_str() {
            "BEGIN" if value.eq_ignore_ascii_case("VCARD") => card = Some(Card::default()),
            "END" if value.eq_ignore_ascii_case("VCARD") => {
                if let Some(contact) = card.take().and_then(|c| c.into_contact(country_code)) {
                    contacts.push(contact);
                }
            }
            "FN" => {
                if let Some(card) = card.as_mut() {
                    card.formatted_name = non_empty(value);
                }
            }
            "N" => {
                if let Some(card) = card.as_mut() {
                    card.structured_name = structured_name(value);
                }
            }
            "TEL" => {
                if let Some(card) = card.as_mut() {
                    if card.phone.is_none() && digit_count(value) >= MIN_PHONE_DIGITS {
                        card.phone = Some(value.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    contacts
}

#[derive(Default)]
struct Card {
    formatted_name: Option<String>,
    structured_name: Option<String>,
    phone: Option<String>,
}

impl Card {
    fn into_contact(self, country_code: &str) -> Option<ParsedContact> {
        let phone = self.phone?;
        let name = self.formatted_name.or(self.structured_name);
        Some(ParsedContact::new(&phone, name, country_code))
    }
}

/// Join folded continuation lines (RFC 6350 §3.2)
fn unfold(content: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in content.lines() {
        match (raw.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(rest), Some(last)) => last.push_str(rest),
            _ => lines.push(raw.trim_end().to_string()),
        }
    }
    lines
}

/// `item1.TEL;TYPE=CELL` -> `TEL`
fn property_name(property: &str) -> String {
    let name = property.split(';').next().unwrap_or_default();
    let name = name.rsplit('.').next().unwrap_or(name);
    name.trim().to_ascii_uppercase()
}

/// `Silva;Ana;;;` -> `Ana Silva`
fn structured_name(value: &str) -> Option<String> {
    let mut parts = value.split(';');
    let family = parts.next().unwrap_or_default().trim();
    let given = parts.next().unwrap_or_default().trim();
    let joined = [given, family]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    non_empty(&joined)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use crate::contacts::process_contact_file;
    use pretty_assertions::assert_eq;

    const CARDS: &str = "BEGIN:VCARD\r\n\
VERSION:3.0\r\n\
FN:Ana Souza\r\n\
N:Souza;Ana;;;\r\n\
item1.TEL;TYPE=CELL:+55 81 99999-1111\r\n\
END:VCARD\r\n\
BEGIN:VCARD\r\n\
VERSION:3.0\r\n\
N:Lima;Rui;;;\r\n\
TEL;TYPE=HOME:3333-4444\r\n\
TEL;TYPE=CELL:(11) 9\r\n 8765-4321\r\n\
END:VCARD\r\n\
BEGIN:VCARD\r\n\
FN:No Phone\r\n\
END:VCARD\r\n";

    #[test]
    fn test_vcard_cards() {
        let report = process_contact_file(CARDS, "text/vcard");
        assert_eq!(report.total, 2);
        assert_eq!(report.valid, 2);

        assert_eq!(report.contacts[0].name.as_deref(), Some("Ana Souza"));
        assert_eq!(report.contacts[0].phone, "5581999991111");

        // name from N, folded TEL line, short landline skipped
        assert_eq!(report.contacts[1].name.as_deref(), Some("Rui Lima"));
        assert_eq!(report.contacts[1].phone, "5511987654321");
    }

    #[test]
    fn test_vcard_mime_is_case_insensitive() {
        let report = process_contact_file(CARDS, "Text/X-VCard");
        assert_eq!(report.total, 2);
    }
}
