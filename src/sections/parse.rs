// Agent payload parser: `<<<section>>>` markers, section options and `<<<<host>>>>` piggyback blocks.

use std::collections::{BTreeMap, HashMap};

use crate::config::is_valid_host_name;
use crate::error::ParseWarning;
use crate::models::{CacheInfo, Row, SourceKind, Section};

/// Everything found in one raw payload.
#[derive(Debug, Default)]
pub struct ParsedPayload {
    /// Sections in order of first appearance. Repeated markers append to the same section.
    pub sections: Vec<Section>,
    /// Raw lines per piggybacked host, in payload order.
    pub piggyback: BTreeMap<String, Vec<String>>,
    /// `persist(UNTIL)` per section name (unix seconds).
    pub persist_until: BTreeMap<String, i64>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedPayload {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }

    /// Sections carrying a `persist` option, with their expiry.
    pub fn persisted_sections(&self) -> Vec<(Section, i64)> {
        self.sections
            .iter()
            .filter_map(|s| self.persist_until.get(&s.name).map(|until| (s.clone(), *until)))
            .collect()
    }
}

#[derive(Debug, Default)]
struct SectionHeader {
    name: String,
    separator: Option<u8>,
    nostrip: bool,
    persist: Option<i64>,
    cached: Option<CacheInfo>,
}

enum Target {
    Discard,
    Section { index: usize, nostrip: bool },
}

enum Piggy {
    Own,
    Host(String),
    Invalid,
}

/// Split `payload` into sections. `host` is the monitored host: a `<<<<host>>>>` marker
/// naming it ends piggyback mode just like `<<<<>>>>` does. `now_secs` dates persisted sections.
pub fn parse_payload(payload: &[u8], host: &str, source: SourceKind, now_secs: i64) -> ParsedPayload {
    let text = String::from_utf8_lossy(payload);
    let mut out = ParsedPayload::default();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut target = Target::Discard;
    let mut piggy = Piggy::Own;

    for (i, raw) in text.split('\n').enumerate() {
        let line_no = i + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let stripped = line.trim();

        if let Some(name) = piggyback_marker(stripped) {
            let name = name.replace(' ', "_");
            piggy = if name.is_empty() || name == host {
                Piggy::Own
            } else if is_valid_host_name(&name) {
                Piggy::Host(name)
            } else {
                out.warnings.push(ParseWarning::InvalidPiggybackHost {
                    line: line_no,
                    name,
                });
                Piggy::Invalid
            };
            // Own lines only resume after the next section header.
            target = Target::Discard;
            continue;
        }

        match &piggy {
            Piggy::Host(target_host) => {
                out.piggyback
                    .entry(target_host.clone())
                    .or_default()
                    .push(line.to_string());
                continue;
            }
            Piggy::Invalid => continue,
            Piggy::Own => {}
        }

        if let Some(header) = section_marker(stripped) {
            // `<<<>>>` closes the current section.
            if header.is_empty() {
                target = Target::Discard;
                continue;
            }
            target = match parse_header(header, line_no, &mut out.warnings) {
                Some(h) => {
                    let idx = *index.entry(h.name.clone()).or_insert_with(|| {
                        out.sections.push(
                            Section::new(h.name.clone(), source).with_separator(h.separator),
                        );
                        out.sections.len() - 1
                    });
                    let section = &mut out.sections[idx];
                    section.separator = h.separator;
                    if let Some(until) = h.persist {
                        section.cache_info = Some(CacheInfo {
                            cached_at: now_secs,
                            interval: until - now_secs,
                        });
                        out.persist_until.insert(h.name.clone(), until);
                    }
                    if h.cached.is_some() {
                        section.cache_info = h.cached;
                    }
                    Target::Section {
                        index: idx,
                        nostrip: h.nostrip,
                    }
                }
                None => Target::Discard,
            };
            continue;
        }

        if stripped.is_empty() {
            continue;
        }
        if let Target::Section { index, nostrip } = target {
            let section = &mut out.sections[index];
            let content = if nostrip { line } else { stripped };
            section.rows.push(split_row(content, section.separator));
        }
    }
    out
}

fn piggyback_marker(line: &str) -> Option<&str> {
    if line.len() >= 8 && line.starts_with("<<<<") && line.ends_with(">>>>") {
        Some(&line[4..line.len() - 4])
    } else {
        None
    }
}

fn section_marker(line: &str) -> Option<&str> {
    if line.len() >= 6 && line.starts_with("<<<") && line.ends_with(">>>") {
        Some(&line[3..line.len() - 3])
    } else {
        None
    }
}

/// `name:opt1(args):opt2`. Returns `None` (with a warning) for markers that must be skipped.
fn parse_header(
    header: &str,
    line: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Option<SectionHeader> {
    let mut parts = header.split(':');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        warnings.push(ParseWarning::EmptySectionName { line });
        return None;
    }
    let mut h = SectionHeader {
        name: name.to_string(),
        ..Default::default()
    };
    for opt in parts {
        let (opt_name, args) = match opt.split_once('(') {
            Some((n, rest)) => (n, Some(rest.strip_suffix(')').unwrap_or(rest))),
            None => (opt, None),
        };
        let args = args.unwrap_or_default();
        match opt_name {
            "sep" => match args.trim().parse::<u8>() {
                Ok(code) => h.separator = Some(code),
                Err(_) => {
                    warnings.push(ParseWarning::InvalidSeparator {
                        line,
                        section: h.name,
                        value: args.to_string(),
                    });
                    return None;
                }
            },
            "nostrip" => h.nostrip = true,
            "persist" => match args.trim().parse::<i64>() {
                Ok(until) => h.persist = Some(until),
                Err(_) => warnings.push(invalid_option(line, &h.name, opt_name, args)),
            },
            "cached" => match parse_cached(args) {
                Some(info) => h.cached = Some(info),
                None => warnings.push(invalid_option(line, &h.name, opt_name, args)),
            },
            // Payloads are decoded lossily as UTF-8 regardless of the declared encoding.
            "encoding" => {}
            _ => {}
        }
    }
    Some(h)
}

fn parse_cached(args: &str) -> Option<CacheInfo> {
    let (at, interval) = args.split_once(',')?;
    Some(CacheInfo {
        cached_at: at.trim().parse().ok()?,
        interval: interval.trim().parse().ok()?,
    })
}

fn invalid_option(line: usize, section: &str, option: &str, value: &str) -> ParseWarning {
    ParseWarning::InvalidOption {
        line,
        section: section.to_string(),
        option: option.to_string(),
        value: value.to_string(),
    }
}

/// Split by the separator byte, keeping empty fields, or by whitespace runs when unset.
pub fn split_row(line: &str, separator: Option<u8>) -> Row {
    match separator {
        Some(code) => line.split(char::from(code)).map(str::to_string).collect(),
        None => line.split_whitespace().map(str::to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &str) -> ParsedPayload {
        parse_payload(payload.as_bytes(), "self", SourceKind::Agent, 1_000)
    }

    #[test]
    fn whitespace_and_separator_split() {
        assert_eq!(split_row("a  b\tc", None), vec!["a", "b", "c"]);
        assert_eq!(split_row("a||b", Some(b'|')), vec!["a", "", "b"]);
        assert_eq!(split_row("a b", Some(0)), vec!["a b"]);
    }

    #[test]
    fn repeated_section_appends() {
        let p = parse("<<<df>>>\n/ 1\n<<<mem>>>\nx 1\n<<<df>>>\n/boot 2\n");
        assert_eq!(p.section_names(), vec!["df", "mem"]);
        assert_eq!(p.section("df").unwrap().rows.len(), 2);
    }

    #[test]
    fn lines_before_first_marker_are_ignored() {
        let p = parse("garbage\n<<<a>>>\nx\n");
        assert_eq!(p.sections.len(), 1);
        assert_eq!(p.sections[0].rows, vec![vec!["x".to_string()]]);
    }

    #[test]
    fn nostrip_keeps_leading_whitespace() {
        let p = parse("<<<a:sep(124):nostrip>>>\n  x|y  \r\n");
        assert_eq!(p.sections[0].rows, vec![vec!["  x".to_string(), "y  ".to_string()]]);
    }

    #[test]
    fn invalid_separator_skips_marker_and_its_lines() {
        let p = parse("<<<a:sep(abc)>>>\nx y\n<<<b>>>\nz\n");
        assert_eq!(p.section_names(), vec!["b"]);
        assert!(matches!(
            p.warnings[0],
            ParseWarning::InvalidSeparator { line: 1, .. }
        ));
    }

    #[test]
    fn empty_name_is_warned() {
        let p = parse("<<<:sep(9)>>>\nx\n");
        assert!(p.sections.is_empty());
        assert_eq!(p.warnings, vec![ParseWarning::EmptySectionName { line: 1 }]);
    }

    #[test]
    fn cached_and_persist_options() {
        let p = parse("<<<a:cached(900,60)>>>\n1\n<<<b:persist(1600)>>>\n2\n");
        assert_eq!(
            p.section("a").unwrap().cache_info,
            Some(CacheInfo {
                cached_at: 900,
                interval: 60
            })
        );
        assert_eq!(p.persist_until.get("b"), Some(&1600));
        let persisted = p.persisted_sections();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].1, 1600);
    }

    #[test]
    fn piggyback_blocks_are_collected_raw() {
        let p = parse(
            "<<<a>>>\n1\n<<<<other host>>>>\n<<<b>>>\n  2\n<<<<self>>>>\n3\n<<<<x>>>>\n<<<c>>>\n<<<<>>>>\n4\n",
        );
        assert_eq!(
            p.piggyback.get("other_host").unwrap(),
            &vec!["<<<b>>>".to_string(), "  2".to_string()]
        );
        assert_eq!(p.piggyback.get("x").unwrap(), &vec!["<<<c>>>".to_string()]);
        // Lines after a piggyback block wait for the next own section header.
        assert_eq!(p.section("a").unwrap().rows, vec![vec!["1".to_string()]]);
        assert!(p.section("b").is_none());
    }

    #[test]
    fn lines_after_piggyback_footer_are_dropped() {
        let p = parse(
            "<<<df>>>\n/dev/sda1 ext4 100 50 50 50% /\n<<<<vm1>>>>\n<<<mem>>>\nMemTotal: 1 kB\n<<<<>>>>\nstray line\n<<<uptime>>>\n42\n",
        );
        assert_eq!(p.section("df").unwrap().rows.len(), 1);
        assert_eq!(p.section_names(), vec!["df", "uptime"]);
        assert!(p.warnings.is_empty());
    }

    #[test]
    fn section_footer_closes_section_silently() {
        let p = parse("<<<a>>>\n1\n<<<>>>\ntrailer\n<<<b>>>\n2\n");
        assert_eq!(p.section("a").unwrap().rows, vec![vec!["1".to_string()]]);
        assert_eq!(p.section("b").unwrap().rows.len(), 1);
        assert!(p.warnings.is_empty());
    }

    #[test]
    fn invalid_piggyback_host_drops_block() {
        let p = parse("<<<<../etc>>>>\n<<<x>>>\n1\n<<<<>>>>\n<<<a>>>\n2\n");
        assert!(p.piggyback.is_empty());
        assert_eq!(p.section_names(), vec!["a"]);
        assert_eq!(p.warnings.len(), 1);
    }
}
