//! Sentence model of the router management protocol.
//!
//! A sentence is an ordered list of words. Requests start with a command path
//! (`/ip/hotspot/active/print`) followed by attribute words (`=key=value`) and
//! query words (`?key=value`). Replies are a run of `!re` sentences closed by
//! `!done`; a `!trap` reports a command error and is itself followed by
//! `!done`; `!fatal` ends the session.
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::ports::mgmt_transport::{TransportError, TransportResult};

/// One request or reply sentence. Words carry no framing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sentence {
    words: Vec<String>,
}

impl Sentence {
    pub fn new(words: Vec<String>) -> Self {
        Self { words }
    }

    /// Start a request sentence with a command path
    pub fn command(path: impl Into<String>) -> Self {
        Self {
            words: vec![path.into()],
        }
    }

    /// Append an attribute word `=key=value`
    pub fn attr(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.words.push(format!("={key}={}", value.as_ref()));
        self
    }

    /// Append a query word `?key=value`
    pub fn query(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.words.push(format!("?{key}={}", value.as_ref()));
        self
    }

    /// Append a raw word as-is
    pub fn word(mut self, word: impl Into<String>) -> Self {
        self.words.push(word.into());
        self
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn into_words(self) -> Vec<String> {
        self.words
    }

    /// First word: the command path of a request or the tag of a reply
    pub fn head(&self) -> Option<&str> {
        self.words.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Parse an operator-typed command line into a request sentence.
    ///
    /// `/system resource print` and `/system/resource/print` are equivalent:
    /// bare words after the leading path are joined as path segments, while
    /// `=k=v` and `?k=v` words are passed through. Returns `None` unless the
    /// line starts with `/`.
    pub fn parse_command_line(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let first = tokens.next()?;
        if !first.starts_with('/') {
            return None;
        }

        let mut path = first.trim_end_matches('/').to_string();
        let mut args = Vec::new();
        for token in tokens {
            if token.starts_with('=') || token.starts_with('?') || !args.is_empty() {
                args.push(token.to_string());
            } else {
                path.push('/');
                path.push_str(token.trim_matches('/'));
            }
        }
        if path.is_empty() {
            path.push('/');
        }

        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(path);
        words.extend(args);
        Some(Self { words })
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.words.join(" "))
    }
}

/// Classification of a single word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word<'a> {
    /// `/path/to/command`
    Command(&'a str),
    /// `!re`, `!done`, `!trap`, `!fatal`
    Reply(&'a str),
    /// `=key=value` (value may be empty, or absent as in `=once`)
    Attribute { key: &'a str, value: &'a str },
    /// `?key=value`
    Query { key: &'a str, value: &'a str },
    /// `.tag=value`
    Tag(&'a str),
    /// Anything else, e.g. the reason text following `!fatal`
    Other(&'a str),
}

impl<'a> Word<'a> {
    pub fn classify(word: &'a str) -> Self {
        if let Some(rest) = word.strip_prefix('=') {
            // key may itself start with '.', e.g. `=.id=*1`
            let (key, value) = rest.split_once('=').unwrap_or((rest, ""));
            Word::Attribute { key, value }
        } else if let Some(rest) = word.strip_prefix('?') {
            let (key, value) = rest.split_once('=').unwrap_or((rest, ""));
            Word::Query { key, value }
        } else if let Some(tag) = word.strip_prefix(".tag=") {
            Word::Tag(tag)
        } else if word.starts_with('!') {
            Word::Reply(word)
        } else if word.starts_with('/') {
            Word::Command(word)
        } else {
            Word::Other(word)
        }
    }
}

/// Attribute map of one reply sentence.
///
/// Keys are kept verbatim (including `.id`); unknown keys are preserved so
/// typed wrappers can pass them through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    attrs: BTreeMap<String, String>,
}

impl Record {
    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a String>) -> Self {
        let mut attrs = BTreeMap::new();
        for word in words {
            if let Word::Attribute { key, value } = Word::classify(word) {
                attrs.insert(key.to_string(), value.to_string());
            }
        }
        Self { attrs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Value of `key`, or the empty string
    pub fn text(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// Parse a numeric (or otherwise typed) field. Missing keys yield
    /// `Ok(None)`; present but malformed values are a protocol error.
    pub fn parse<T: FromStr>(&self, key: &str) -> TransportResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) if raw.is_empty() => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                TransportError::Protocol(format!("field '{key}' is not numeric: {raw:?}"))
            }),
        }
    }

    /// Router object id (`.id`)
    pub fn id(&self) -> Option<&str> {
        self.get(".id")
    }

    /// Every attribute whose key is not listed in `known`
    pub fn remaining(&self, known: &[&str]) -> BTreeMap<String, String> {
        self.attrs
            .iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }
}

/// A complete reply: every `!re` record plus the attributes of `!done`
/// (for example `ret` carrying a login challenge or a new object id).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub re: Vec<Record>,
    pub done: Record,
}

impl Reply {
    pub fn first(&self) -> Option<&Record> {
        self.re.first()
    }

    /// `=ret=` of the `!done` sentence
    pub fn ret(&self) -> Option<&str> {
        self.done.get("ret")
    }
}

/// Accumulates reply sentences until the reply is complete.
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    reply: Reply,
    trap: Option<TransportError>,
}

impl ReplyAssembler {
    /// Feed one sentence. Returns `Some` once `!done` or `!fatal` arrives.
    pub fn push(&mut self, sentence: Sentence) -> Option<TransportResult<Reply>> {
        let Some(head) = sentence.head() else {
            return None;
        };
        match head {
            "!re" => {
                self.reply.re.push(Record::from_words(&sentence.words()[1..]));
                None
            }
            "!trap" => {
                let record = Record::from_words(&sentence.words()[1..]);
                // Keep the first trap; the router may send several before !done
                if self.trap.is_none() {
                    self.trap = Some(TransportError::Trap {
                        category: record.get("category").and_then(|c| c.parse().ok()),
                        message: record
                            .get("message")
                            .unwrap_or("command failed")
                            .to_string(),
                    });
                }
                None
            }
            "!done" => {
                let done = Record::from_words(&sentence.words()[1..]);
                let result = match self.trap.take() {
                    Some(trap) => Err(trap),
                    None => {
                        let mut reply = std::mem::take(&mut self.reply);
                        reply.done = done;
                        Ok(reply)
                    }
                };
                Some(result)
            }
            "!fatal" => {
                let reason = sentence.words()[1..]
                    .iter()
                    .map(|w| match Word::classify(w) {
                        Word::Attribute { value, .. } => value.to_string(),
                        _ => w.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(Err(TransportError::Fatal(reason)))
            }
            other => {
                tracing::debug!(reply = other, "ignoring unexpected reply sentence");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(words: &[&str]) -> Sentence {
        Sentence::new(words.iter().map(|w| w.to_string()).collect())
    }

    #[test]
    fn test_builder_words() {
        let s = Sentence::command("/interface/monitor-traffic")
            .attr("interface", "ether1")
            .word("=once")
            .query("comment", "MARINE_BLOCK");
        assert_eq!(
            s.words(),
            &[
                "/interface/monitor-traffic",
                "=interface=ether1",
                "=once",
                "?comment=MARINE_BLOCK"
            ]
        );
        assert_eq!(s.head(), Some("/interface/monitor-traffic"));
    }

    #[test]
    fn test_classify_words() {
        assert_eq!(
            Word::classify("=.id=*1A"),
            Word::Attribute {
                key: ".id",
                value: "*1A"
            }
        );
        assert_eq!(
            Word::classify("=regexp=^.+(a=b).*$"),
            Word::Attribute {
                key: "regexp",
                value: "^.+(a=b).*$"
            }
        );
        assert_eq!(
            Word::classify("=once"),
            Word::Attribute {
                key: "once",
                value: ""
            }
        );
        assert_eq!(
            Word::classify("?user=alice"),
            Word::Query {
                key: "user",
                value: "alice"
            }
        );
        assert_eq!(Word::classify("!done"), Word::Reply("!done"));
        assert_eq!(Word::classify(".tag=7"), Word::Tag("7"));
        assert_eq!(Word::classify("/login"), Word::Command("/login"));
    }

    #[test]
    fn test_parse_command_line() {
        let s = Sentence::parse_command_line("/system resource print").unwrap();
        assert_eq!(s.words(), &["/system/resource/print"]);

        let s = Sentence::parse_command_line("/ip/hotspot/active/print ?user=bob").unwrap();
        assert_eq!(s.words(), &["/ip/hotspot/active/print", "?user=bob"]);

        let s = Sentence::parse_command_line("  /ip address add =address=10.0.0.1/24 =interface=ether2 ")
            .unwrap();
        assert_eq!(
            s.words(),
            &[
                "/ip/address/add",
                "=address=10.0.0.1/24",
                "=interface=ether2"
            ]
        );

        assert!(Sentence::parse_command_line("system resource print").is_none());
        assert!(Sentence::parse_command_line("   ").is_none());
    }

    #[test]
    fn test_record_parse() {
        let record = Record::from_words(&vec![
            "=cpu-load=7".to_string(),
            "=free-memory=oops".to_string(),
            "=board-name=CCR2004".to_string(),
        ]);
        assert_eq!(record.parse::<u32>("cpu-load").unwrap(), Some(7));
        assert_eq!(record.parse::<u32>("missing").unwrap(), None);
        assert!(matches!(
            record.parse::<u64>("free-memory"),
            Err(TransportError::Protocol(_))
        ));
        let extra = record.remaining(&["cpu-load", "free-memory"]);
        assert_eq!(extra.len(), 1);
        assert_eq!(extra.get("board-name").map(String::as_str), Some("CCR2004"));
    }

    #[test]
    fn test_assembler_collects_records_until_done() {
        let mut asm = ReplyAssembler::default();
        assert!(asm.push(reply(&["!re", "=.id=*1", "=user=alice"])).is_none());
        assert!(asm.push(reply(&["!re", "=.id=*2", "=user=bob"])).is_none());
        let done = asm.push(reply(&["!done", "=ret=*3"])).unwrap().unwrap();
        assert_eq!(done.re.len(), 2);
        assert_eq!(done.re[1].get("user"), Some("bob"));
        assert_eq!(done.ret(), Some("*3"));
    }

    #[test]
    fn test_assembler_reports_trap_after_done() {
        let mut asm = ReplyAssembler::default();
        assert!(
            asm.push(reply(&["!trap", "=category=1", "=message=invalid user name or password"]))
                .is_none()
        );
        let err = asm.push(reply(&["!done"])).unwrap().unwrap_err();
        assert_eq!(
            err,
            TransportError::Trap {
                category: Some(1),
                message: "invalid user name or password".into()
            }
        );
    }

    #[test]
    fn test_assembler_fatal() {
        let mut asm = ReplyAssembler::default();
        let err = asm
            .push(reply(&["!fatal", "too many commands before login"]))
            .unwrap()
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Fatal("too many commands before login".into())
        );
    }
}
