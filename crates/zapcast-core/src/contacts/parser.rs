//! Delimited text contact lists

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use zapcast_common::phone::{
    digit_count, normalize_phone_with, DEFAULT_COUNTRY_CODE, MIN_PHONE_DIGITS,
};
use zapcast_storage::models::NewCampaignContact;

use super::vcard;

/// Words that mark the first line as a header
const HEADER_KEYWORDS: &[&str] = &[
    "phone", "telefone", "fone", "celular", "whatsapp", "numero", "número", "number", "mobile",
    "name", "nome", "contato", "contact",
];

/// Header words that identify the name column
const NAME_COLUMN_KEYWORDS: &[&str] = &["nome", "name", "contato", "contact"];

/// One contact read from an uploaded list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedContact {
    /// Normalized phone (digits only)
    pub phone: String,
    /// Phone as it appeared in the file
    pub raw_phone: String,
    pub name: Option<String>,
    /// Extra columns keyed by lower-cased header name
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ParsedContact {
    pub(crate) fn new(raw_phone: &str, name: Option<String>, country_code: &str) -> Self {
        let normalized = normalize_phone_with(raw_phone, country_code);
        let error = (!normalized.is_valid).then(|| {
            format!(
                "Invalid phone number: expected 10 to 13 digits, got {}",
                digit_count(raw_phone)
            )
        });

        Self {
            phone: normalized.normalized,
            raw_phone: raw_phone.to_string(),
            name,
            variables: BTreeMap::new(),
            is_valid: normalized.is_valid,
            error,
        }
    }
}

impl From<ParsedContact> for NewCampaignContact {
    fn from(contact: ParsedContact) -> Self {
        Self {
            phone: contact.phone,
            name: contact.name,
            variables: contact.variables,
        }
    }
}

/// Result of parsing a contact list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactParseReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub contacts: Vec<ParsedContact>,
}

impl ContactParseReport {
    pub fn from_contacts(contacts: Vec<ParsedContact>) -> Self {
        let valid = contacts.iter().filter(|c| c.is_valid).count();
        Self {
            total: contacts.len(),
            valid,
            invalid: contacts.len() - valid,
            contacts,
        }
    }

    /// Valid contacts only, ready to insert into a campaign
    pub fn valid_contacts(&self) -> Vec<NewCampaignContact> {
        self.contacts
            .iter()
            .filter(|c| c.is_valid)
            .cloned()
            .map(NewCampaignContact::from)
            .collect()
    }
}

/// How a file's lines are tokenized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    /// Split on comma, semicolon, pipe and tab
    Delimited,
    /// Split on tab only, so names may contain commas
    TabSeparated,
    VCard,
}

impl ContentKind {
    fn from_mime(mime_type: &str) -> Self {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "text/vcard" | "text/x-vcard" | "text/directory" => ContentKind::VCard,
            "text/tab-separated-values" => ContentKind::TabSeparated,
            _ => ContentKind::Delimited,
        }
    }

    fn is_delimiter(&self, c: char) -> bool {
        match self {
            ContentKind::TabSeparated => c == '\t',
            _ => matches!(c, ',' | ';' | '|' | '\t'),
        }
    }
}

/// Parses uploaded contact lists
#[derive(Debug, Clone)]
pub struct ContactListParser {
    country_code: String,
}

impl Default for ContactListParser {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODE)
    }
}

impl ContactListParser {
    /// Create a parser that prefixes `country_code` to national numbers
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
        }
    }

    /// Normalize a contact given field by field, as in a JSON upload
    pub fn contact(
        &self,
        phone: &str,
        name: Option<String>,
        variables: BTreeMap<String, String>,
    ) -> ParsedContact {
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        ParsedContact {
            variables: variables
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v))
                .collect(),
            ..ParsedContact::new(phone, name, &self.country_code)
        }
    }

    /// Parse `content` according to its declared `mime_type`.
    ///
    /// vCard types are read card by card; anything else is treated as
    /// delimited text.
    pub fn parse(&self, content: &str, mime_type: &str) -> ContactParseReport {
        let kind = ContentKind::from_mime(mime_type);
        let content = content.trim_start_matches('\u{feff}');

        let contacts = match kind {
            ContentKind::VCard => vcard::parse_cards(content, &self.country_code),
            _ => self.parse_delimited(content, kind),
        };

        let report = ContactParseReport::from_contacts(contacts);
        debug!(
            mime_type,
            total = report.total,
            valid = report.valid,
            invalid = report.invalid,
            "Parsed contact list"
        );
        report
    }

    fn parse_delimited(&self, content: &str, kind: ContentKind) -> Vec<ParsedContact> {
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let Some((first, rest)) = lines.split_first() else {
            return Vec::new();
        };

        let first_tokens = tokenize(first, kind);
        let (header, body) = if is_header(&first_tokens) {
            let header: Vec<String> = first_tokens.iter().map(|t| t.to_lowercase()).collect();
            (Some(header), rest)
        } else {
            (None, &lines[..])
        };

        body.iter()
            .filter_map(|line| self.parse_line(line, kind, header.as_deref()))
            .collect()
    }

    fn parse_line(
        &self,
        line: &str,
        kind: ContentKind,
        header: Option<&[String]>,
    ) -> Option<ParsedContact> {
        let tokens = tokenize(line, kind);

        if tokens.len() <= 1 {
            // no delimiter: the whole line is a bare number
            if digit_count(line) < MIN_PHONE_DIGITS {
                return None;
            }
            return Some(ParsedContact::new(line, None, &self.country_code));
        }

        let phone_idx = tokens
            .iter()
            .position(|t| digit_count(t) >= MIN_PHONE_DIGITS)?;

        let header_name_idx = header.and_then(|h| {
            h.iter().position(|col| {
                NAME_COLUMN_KEYWORDS.iter().any(|k| col.contains(k))
            })
        });

        let name_idx = header_name_idx
            .filter(|&i| i != phone_idx && tokens.get(i).is_some_and(|t| !t.is_empty()))
            .or_else(|| {
                tokens
                    .iter()
                    .enumerate()
                    .position(|(i, t)| i != phone_idx && is_non_numeric(t))
            });

        let mut contact = ParsedContact::new(
            &tokens[phone_idx],
            name_idx.map(|i| tokens[i].clone()),
            &self.country_code,
        );

        if let Some(header) = header {
            contact.variables = tokens
                .iter()
                .enumerate()
                .filter(|(i, t)| Some(*i) != name_idx && *i != phone_idx && !t.is_empty())
                .filter_map(|(i, t)| {
                    header
                        .get(i)
                        .filter(|col| !col.is_empty())
                        .map(|col| (col.clone(), t.clone()))
                })
                .collect();
        }

        Some(contact)
    }
}

/// Parse a contact file with the default country code
pub fn process_contact_file(content: &str, mime_type: &str) -> ContactParseReport {
    ContactListParser::default().parse(content, mime_type)
}

fn tokenize(line: &str, kind: ContentKind) -> Vec<String> {
    line.split(|c| kind.is_delimiter(c))
        .map(|t| t.trim().trim_matches('"').trim().to_string())
        .collect()
}

fn is_header(tokens: &[String]) -> bool {
    if tokens.iter().any(|t| digit_count(t) >= MIN_PHONE_DIGITS) {
        return false;
    }
    tokens.iter().any(|t| {
        let t = t.to_lowercase();
        HEADER_KEYWORDS.iter().any(|k| t.contains(k))
    })
}

fn is_non_numeric(token: &str) -> bool {
    token.chars().any(char::is_alphabetic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mixed_delimiters_and_junk_line() {
        let report = process_contact_file(
            "5511999998888,João\n0000\n+55 (21) 98888-7777;Maria",
            "text/csv",
        );

        assert_eq!(report.total, 2);
        assert_eq!(report.valid, 2);
        assert_eq!(report.invalid, 0);

        let phones: Vec<&str> = report.contacts.iter().map(|c| c.phone.as_str()).collect();
        assert_eq!(phones, vec!["5511999998888", "5521988887777"]);
        assert_eq!(report.contacts[0].name.as_deref(), Some("João"));
        assert_eq!(report.contacts[1].name.as_deref(), Some("Maria"));
    }

    #[test]
    fn test_header_is_skipped_and_columns_become_variables() {
        let csv = "Nome,Telefone,Cidade,Cupom\n\
                   Ana Souza,(81) 99999-1111,Recife,BF10\n\
                   \"Bruno\",81988882222,Olinda,\n";
        let report = process_contact_file(csv, "text/csv; charset=utf-8");

        assert_eq!(report.total, 2);
        let ana = &report.contacts[0];
        assert_eq!(ana.phone, "5581999991111");
        assert_eq!(ana.name.as_deref(), Some("Ana Souza"));
        assert_eq!(ana.variables.get("cidade").map(String::as_str), Some("Recife"));
        assert_eq!(ana.variables.get("cupom").map(String::as_str), Some("BF10"));
        assert!(!ana.variables.contains_key("telefone"));

        let bruno = &report.contacts[1];
        assert_eq!(bruno.name.as_deref(), Some("Bruno"));
        assert!(!bruno.variables.contains_key("cupom"));
    }

    #[test]
    fn test_name_before_phone_and_pipe_delimiter() {
        let report = process_contact_file("Carlos | 11 98765-4321 | 42", "text/plain");
        assert_eq!(report.total, 1);
        assert_eq!(report.contacts[0].phone, "5511987654321");
        assert_eq!(report.contacts[0].name.as_deref(), Some("Carlos"));
        assert!(report.contacts[0].variables.is_empty());
    }

    #[test]
    fn test_bare_numbers() {
        let report = process_contact_file("5511999990000\n\n  21988887777  \nhello\n", "text/plain");
        assert_eq!(report.total, 2);
        assert_eq!(report.contacts[1].phone, "5521988887777");
        assert_eq!(report.contacts[1].raw_phone, "21988887777");
        assert!(report.contacts.iter().all(|c| c.name.is_none()));
    }

    #[test]
    fn test_overlong_number_is_counted_invalid() {
        let report = process_contact_file("55119999988887777,Zé\n5511999998888,Lia", "text/csv");
        assert_eq!(report.total, 2);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 1);

        let bad = &report.contacts[0];
        assert!(!bad.is_valid);
        assert!(bad.error.as_deref().unwrap_or_default().contains("17"));
        assert_eq!(report.valid_contacts().len(), 1);
        assert_eq!(report.valid_contacts()[0].phone, "5511999998888");
    }

    #[test]
    fn test_tsv_keeps_commas_in_names() {
        let report = process_contact_file(
            "Silva, Ana\t5511912345678",
            "text/tab-separated-values",
        );
        assert_eq!(report.contacts[0].name.as_deref(), Some("Silva, Ana"));
    }

    #[test]
    fn test_data_line_with_keyword_is_not_header() {
        let report = process_contact_file("5511999998888,Contato Loja\n5511999997777,Rui", "text/csv");
        assert_eq!(report.total, 2);
        assert_eq!(report.contacts[0].name.as_deref(), Some("Contato Loja"));
    }

    #[test]
    fn test_empty_and_header_only() {
        assert_eq!(process_contact_file("", "text/csv"), ContactParseReport::default());
        assert_eq!(process_contact_file("phone,name\n", "text/csv").total, 0);
    }

    #[test]
    fn test_custom_country_code() {
        let report = ContactListParser::new("351").parse("912345678,Inês\n2123456789,Rui", "text/csv");
        // 9 digits is not a plausible phone, the line is skipped
        assert_eq!(report.total, 1);
        assert_eq!(report.contacts[0].phone, "3512123456789");
    }

    #[test]
    fn test_contact_from_fields() {
        let parser = ContactListParser::default();
        let vars = BTreeMap::from([(" Cupom ".to_string(), "BF10".to_string())]);

        let contact = parser.contact("(11) 98765-4321", Some("  Ana ".to_string()), vars);
        assert_eq!(contact.phone, "5511987654321");
        assert_eq!(contact.name.as_deref(), Some("Ana"));
        assert_eq!(contact.variables.get("cupom").map(String::as_str), Some("BF10"));

        let invalid = parser.contact("12345", Some(" ".to_string()), BTreeMap::new());
        assert!(!invalid.is_valid);
        assert_eq!(invalid.name, None);
        assert!(invalid.error.is_some());
    }
}
