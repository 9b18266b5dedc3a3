/// `@username` tokens in a body, lowercased, deduplicated in first-seen order.
///
/// An `@` only starts a mention at the beginning of the text or after a
/// character that cannot be part of a username, so addresses like
/// `alice@example.com` are ignored.
pub fn extract_mentions(body: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let at_boundary = i == 0 || !is_name_char(chars[i - 1]);
        if chars[i] == '@' && at_boundary {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && is_name_char(chars[end]) {
                end += 1;
            }
            let name: String = chars[start..end].iter().collect::<String>().to_lowercase();
            if (3..=32).contains(&name.len()) && !found.contains(&name) {
                found.push(name);
            }
            i = end.max(start);
        } else {
            i += 1;
        }
    }
    found
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_mentions() {
        assert_eq!(extract_mentions("hi @alice and @Bob_2!"), vec!["alice", "bob_2"]);
    }

    #[test]
    fn deduplicates_case_insensitively() {
        assert_eq!(extract_mentions("@alice @ALICE @alice"), vec!["alice"]);
    }

    #[test]
    fn ignores_emails_and_short_names() {
        assert!(extract_mentions("mail alice@example.com").is_empty());
        assert!(extract_mentions("@ab is too short").is_empty());
        assert!(extract_mentions("a lone @ sign").is_empty());
    }

    #[test]
    fn mention_at_line_start_and_after_punctuation() {
        assert_eq!(extract_mentions("@carol\n(@dave)"), vec!["carol", "dave"]);
    }
}
