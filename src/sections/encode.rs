// Section wire format encoder (inverse of the parser for rows without embedded separators).

use crate::models::Section;

/// `<<<name[:sep(N)][:cached(AT,INTERVAL)]>>>` followed by one line per row.
pub fn encode_section(section: &Section) -> String {
    let mut out = String::from("<<<");
    out.push_str(&section.name);
    if let Some(code) = section.separator {
        out.push_str(&format!(":sep({})", code));
    }
    if let Some(info) = section.cache_info {
        out.push_str(&format!(":cached({},{})", info.cached_at, info.interval));
    }
    out.push_str(">>>\n");
    let sep = section.separator_char().unwrap_or(' ').to_string();
    for row in &section.rows {
        out.push_str(&row.join(&sep));
        out.push('\n');
    }
    out
}

pub fn encode_sections<'a>(sections: impl IntoIterator<Item = &'a Section>) -> Vec<u8> {
    let mut out = String::new();
    for s in sections {
        out.push_str(&encode_section(s));
    }
    out.into_bytes()
}

/// A `<<<<host>>>>` block terminated by `<<<<>>>>`.
pub fn encode_piggyback_block(host: &str, lines: &[String]) -> String {
    let mut out = format!("<<<<{}>>>>\n", host);
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("<<<<>>>>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use crate::sections::parse_payload;

    #[test]
    fn tab_separated_section() {
        let s = Section::new("snmp_info", SourceKind::Snmp)
            .with_separator(Some(9))
            .with_rows(vec![vec![".1.3".into(), "Linux box".into()]]);
        assert_eq!(encode_section(&s), "<<<snmp_info:sep(9)>>>\n.1.3\tLinux box\n");
    }

    #[test]
    fn parse_reads_back_encoded_sections() {
        let s = Section::new("df", SourceKind::Agent).with_rows(vec![
            vec!["/dev/sda1".into(), "ext4".into(), "100".into()],
            vec!["tmpfs".into(), "tmpfs".into(), "5".into()],
        ]);
        let parsed = parse_payload(&encode_sections([&s]), "h", SourceKind::Agent, 0);
        assert_eq!(parsed.sections, vec![s]);
    }

    #[test]
    fn piggyback_block_round_trip() {
        let block = encode_piggyback_block("b", &["<<<mem>>>".into(), "MemTotal: 1 kB".into()]);
        let parsed = parse_payload(block.as_bytes(), "a", SourceKind::Agent, 0);
        assert_eq!(parsed.piggyback["b"].len(), 2);
        assert!(parsed.sections.is_empty());
    }
}
