//! Header and tag normalization
//!
//! Raw source column names become canonical uppercase tags before any row is
//! read. Validation here is terminal for the whole session: an import never
//! proceeds past a header it cannot map.

use crate::services::import::error::ImportError;

/// Platform template tags that subscriber fields may never shadow
pub const RESERVED_TAGS: &[&str] = &[
    "SUBSCRIBE_URL",
    "UNSUBSCRIBE_URL",
    "UPDATE_PROFILE_URL",
    "WEB_VERSION_URL",
    "FORWARD_FRIEND_URL",
    "COMPANY_NAME",
    "COMPANY_FULL_ADDRESS",
    "CURRENT_YEAR",
    "CURRENT_MONTH",
    "CURRENT_DAY",
    "CURRENT_DATE",
    "LIST_NAME",
    "LIST_UID",
];

/// Which of the conditionally-folded tags the target list already defines
#[derive(Debug, Clone, Copy, Default)]
pub struct DefinedTags {
    pub has_fname: bool,
    pub has_lname: bool,
}

/// One header column with its resolved tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderColumn {
    pub name: String,
    pub tag: String,
}

/// Turn arbitrary column text into an uppercase underscore-delimited tag.
/// Whitespace and hyphens become underscores, anything outside [A-Z0-9_] is
/// dropped, runs collapse and edges are trimmed.
pub fn tag_from_string(raw: &str) -> String {
    let mut tag = String::with_capacity(raw.len());
    let mut last_was_underscore = false;

    for ch in raw.to_uppercase().chars() {
        let mapped = if ch.is_whitespace() || ch == '-' || ch == '_' {
            Some('_')
        } else if ch.is_ascii_uppercase() || ch.is_ascii_digit() {
            Some(ch)
        } else {
            None
        };

        match mapped {
            Some('_') => {
                if !last_was_underscore && !tag.is_empty() {
                    tag.push('_');
                    last_was_underscore = true;
                }
            }
            Some(ch) => {
                tag.push(ch);
                last_was_underscore = false;
            }
            None => {}
        }
    }

    tag.trim_end_matches('_').to_string()
}

/// Fold common synonyms onto the canonical tags. The email synonyms always
/// fold; first/last name synonyms fold only onto tags the list already has,
/// so a list without FNAME keeps a literal FIRST_NAME field.
fn fold_synonyms(tag: String, defined: &DefinedTags) -> String {
    match tag.as_str() {
        "E_MAIL" | "EMAIL_ADDRESS" | "EMAILADDRESS" => "EMAIL".to_string(),
        "F_NAME" | "FIRST_NAME" | "FIRSTNAME" if defined.has_fname => "FNAME".to_string(),
        "L_NAME" | "LAST_NAME" | "LASTNAME" if defined.has_lname => "LNAME".to_string(),
        _ => tag,
    }
}

/// Normalize and validate a raw header.
///
/// Rejections, in order of detection: a column whose tag comes out empty,
/// any tag colliding with the reserved registry, and a header with no EMAIL
/// tag. The `email_hint` names a source column to treat as the email address;
/// when no column normalizes to EMAIL on its own, the hinted column's tag is
/// rewritten to EMAIL.
pub fn normalize_header(
    header: &[String],
    defined: &DefinedTags,
    email_hint: Option<&str>,
) -> Result<Vec<HeaderColumn>, ImportError> {
    let mut columns = Vec::with_capacity(header.len());

    for (index, name) in header.iter().enumerate() {
        let tag = fold_synonyms(tag_from_string(name), defined);
        if tag.is_empty() {
            return Err(ImportError::EmptyColumnName(index + 1));
        }
        columns.push(HeaderColumn {
            name: name.trim().to_string(),
            tag,
        });
    }

    let reserved: Vec<&str> = columns
        .iter()
        .filter(|column| RESERVED_TAGS.contains(&column.tag.as_str()))
        .map(|column| column.name.as_str())
        .collect();
    if !reserved.is_empty() {
        return Err(ImportError::ReservedColumns(reserved.join(", ")));
    }

    let mut has_email = columns.iter().any(|column| column.tag == "EMAIL");

    if !has_email {
        if let Some(hint) = email_hint {
            for column in columns.iter_mut() {
                if column.name.eq_ignore_ascii_case(hint.trim()) {
                    column.tag = "EMAIL".to_string();
                    has_email = true;
                    break;
                }
            }
        }
    }

    if !has_email {
        return Err(ImportError::MissingEmailColumn);
    }

    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_tag_from_string_transform_table() {
        assert_eq!(tag_from_string("Email"), "EMAIL");
        assert_eq!(tag_from_string("E-Mail"), "E_MAIL");
        assert_eq!(tag_from_string("First Name"), "FIRST_NAME");
        assert_eq!(tag_from_string("  spaced   out  "), "SPACED_OUT");
        assert_eq!(tag_from_string("Phone (mobile)"), "PHONE_MOBILE");
        assert_eq!(tag_from_string("zip_code_2"), "ZIP_CODE_2");
        assert_eq!(tag_from_string("a--b__c"), "A_B_C");
        assert_eq!(tag_from_string("***"), "");
        assert_eq!(tag_from_string(""), "");
    }

    #[test]
    fn test_email_synonyms_always_fold() {
        let defined = DefinedTags::default();
        for name in ["E-Mail", "email_address", "EMAILADDRESS", "Email Address"] {
            let columns = normalize_header(&header(&[name]), &defined, None).unwrap();
            assert_eq!(columns[0].tag, "EMAIL", "column {name} should fold to EMAIL");
        }
    }

    #[test]
    fn test_name_synonyms_fold_only_when_list_defines_tag() {
        let without = DefinedTags::default();
        let columns =
            normalize_header(&header(&["Email", "First Name", "Last-Name"]), &without, None)
                .unwrap();
        assert_eq!(columns[1].tag, "FIRST_NAME");
        assert_eq!(columns[2].tag, "LAST_NAME");

        let with = DefinedTags {
            has_fname: true,
            has_lname: true,
        };
        let columns =
            normalize_header(&header(&["Email", "First Name", "Last-Name"]), &with, None).unwrap();
        assert_eq!(columns[1].tag, "FNAME");
        assert_eq!(columns[2].tag, "LNAME");
    }

    #[test]
    fn test_empty_column_rejected() {
        let defined = DefinedTags::default();
        let err = normalize_header(&header(&["Email", ""]), &defined, None).unwrap_err();
        assert!(matches!(err, ImportError::EmptyColumnName(2)));

        // Symbols-only names normalize to nothing
        let err = normalize_header(&header(&["Email", "***"]), &defined, None).unwrap_err();
        assert!(matches!(err, ImportError::EmptyColumnName(2)));
    }

    #[test]
    fn test_reserved_columns_rejected_with_names() {
        let defined = DefinedTags::default();
        let err = normalize_header(
            &header(&["Email", "Subscribe URL", "current year"]),
            &defined,
            None,
        )
        .unwrap_err();
        match err {
            ImportError::ReservedColumns(names) => {
                assert!(names.contains("Subscribe URL"));
                assert!(names.contains("current year"));
            }
            other => panic!("expected ReservedColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_header_without_email_rejected() {
        let defined = DefinedTags::default();
        let err = normalize_header(&header(&["Name", "Phone"]), &defined, None).unwrap_err();
        assert!(matches!(err, ImportError::MissingEmailColumn));
    }

    #[test]
    fn test_email_hint_rewrites_hinted_column() {
        let defined = DefinedTags::default();
        let columns = normalize_header(
            &header(&["contact_mail", "Name"]),
            &defined,
            Some("contact_mail"),
        )
        .unwrap();
        assert_eq!(columns[0].tag, "EMAIL");
        assert_eq!(columns[1].tag, "NAME");
    }

    #[test]
    fn test_email_hint_ignored_when_header_already_has_email() {
        let defined = DefinedTags::default();
        let columns =
            normalize_header(&header(&["Email", "backup_mail"]), &defined, Some("backup_mail"))
                .unwrap();
        assert_eq!(columns[0].tag, "EMAIL");
        assert_eq!(columns[1].tag, "BACKUP_MAIL");
    }

    #[test]
    fn test_email_hint_matching_no_column_still_rejects() {
        let defined = DefinedTags::default();
        let err = normalize_header(&header(&["Name", "Phone"]), &defined, Some("contact_mail"))
            .unwrap_err();
        assert!(matches!(err, ImportError::MissingEmailColumn));
    }
}
