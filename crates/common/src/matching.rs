use moor_var::Objid;
use serde::{Deserialize, Serialize};

/// Whether a verb's dobj/iobj slot accepts `this`, nothing, or any object (spec.md §4.6 step 5:
/// "argspec `{this-or-none-or-any, prep-slot, this-or-none-or-any}`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgSpec {
    None,
    Any,
    This,
}

impl ArgSpec {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ArgSpec::None),
            "any" => Some(ArgSpec::Any),
            "this" => Some(ArgSpec::This),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_str(self) -> &'static str {
        match self {
            ArgSpec::None => "none",
            ArgSpec::Any => "any",
            ArgSpec::This => "this",
        }
    }

    /// Whether `candidate` (the object the command parser resolved for this slot, or `NOTHING`
    /// if none was typed) satisfies this spec against `receiver` (the object currently being
    /// tried as the verb's defining/dispatch target). `This` requires the specific identity
    /// match `candidate == receiver`, not mere presence -- matching a `this`-argspec verb on an
    /// object that merely *has* a dobj typed, regardless of which object it resolved to, would
    /// let e.g. a sword's `this none this` verb fire when the player types "drop sword" while
    /// holding an unrelated third object as dobj.
    #[must_use]
    pub fn matches(self, candidate: Objid, receiver: Objid) -> bool {
        match self {
            ArgSpec::None => candidate == Objid::NOTHING,
            ArgSpec::Any => true,
            ArgSpec::This => candidate == receiver,
        }
    }
}

/// The fixed preposition table (spec.md §4.6 step 3). Each variant may have several surface
/// spellings; `Preposition::parse` tries the longest phrase first so `"in front of"` isn't
/// mis-split by the shorter `"in"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preposition {
    With,
    At,
    InFrontOf,
    In,
    OnTopOf,
    OutOf,
    Over,
    Through,
    Under,
    Behind,
    Beside,
    For,
    Is,
    As,
    Off,
}

/// Every accepted spelling, longest phrases first so greedy left-to-right scanning picks the
/// most specific match (e.g. `"in front of"` before the bare `"in"`).
const PREP_TABLE: &[(&str, Preposition)] = &[
    ("with", Preposition::With),
    ("using", Preposition::With),
    ("at", Preposition::At),
    ("to", Preposition::At),
    ("in front of", Preposition::InFrontOf),
    ("in", Preposition::In),
    ("inside", Preposition::In),
    ("into", Preposition::In),
    ("on top of", Preposition::OnTopOf),
    ("on", Preposition::OnTopOf),
    ("onto", Preposition::OnTopOf),
    ("upon", Preposition::OnTopOf),
    ("out of", Preposition::OutOf),
    ("from inside", Preposition::OutOf),
    ("from", Preposition::OutOf),
    ("over", Preposition::Over),
    ("through", Preposition::Through),
    ("under", Preposition::Under),
    ("underneath", Preposition::Under),
    ("beneath", Preposition::Under),
    ("behind", Preposition::Behind),
    ("beside", Preposition::Beside),
    ("for", Preposition::For),
    ("about", Preposition::For),
    ("is", Preposition::Is),
    ("as", Preposition::As),
    ("off", Preposition::Off),
    ("off of", Preposition::Off),
];

impl Preposition {
    /// Scans `words` left to right; returns the index range `[start, end)` of the first (and
    /// longest at that position) matching preposition phrase, plus the variant, or `None`.
    #[must_use]
    pub fn find_in(words: &[&str]) -> Option<(usize, usize, Preposition)> {
        let lower: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
        for start in 0..lower.len() {
            // Try longest phrases (up to 3 words) first at this starting position.
            for len in (1..=3usize.min(lower.len() - start)).rev() {
                let phrase = lower[start..start + len].join(" ");
                if let Some((_, p)) = PREP_TABLE.iter().find(|(s, _)| *s == phrase) {
                    return Some((start, start + len, *p));
                }
            }
        }
        None
    }

    #[must_use]
    pub fn canonical(self) -> &'static str {
        match self {
            Preposition::With => "with",
            Preposition::At => "at",
            Preposition::InFrontOf => "in front of",
            Preposition::In => "in",
            Preposition::OnTopOf => "on top of",
            Preposition::OutOf => "out of",
            Preposition::Over => "over",
            Preposition::Through => "through",
            Preposition::Under => "under",
            Preposition::Behind => "behind",
            Preposition::Beside => "beside",
            Preposition::For => "for",
            Preposition::Is => "is",
            Preposition::As => "as",
            Preposition::Off => "off",
        }
    }
}

/// A verb's declared preposition slot: no preposition accepted, any preposition accepted, or one
/// specific preposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrepSpec {
    None,
    Any,
    Specific(Preposition),
}

impl PrepSpec {
    #[must_use]
    pub fn matches(self, parsed: Option<Preposition>) -> bool {
        match self {
            PrepSpec::None => parsed.is_none(),
            PrepSpec::Any => true,
            PrepSpec::Specific(p) => parsed == Some(p),
        }
    }
}

/// The full `{dobj, prep, iobj}` argument specifier stored on a verb (spec.md §3 "verbs" field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerbArgsSpec {
    pub dobj: ArgSpec,
    pub prep: PrepSpec,
    pub iobj: ArgSpec,
}

impl VerbArgsSpec {
    #[must_use]
    pub const fn this_none_this() -> Self {
        VerbArgsSpec {
            dobj: ArgSpec::This,
            prep: PrepSpec::None,
            iobj: ArgSpec::This,
        }
    }
}

/// A parsed command line, per spec.md §4.6. `dobjstr`/`iobjstr` are the raw matched text (prior
/// to object resolution), `dobj`/`iobj` are resolved object references filled in by the command
/// dispatcher (`#-1`/`#-2`/`#-3` sentinels per spec.md §3).
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub verb: String,
    pub argstr: String,
    pub args: Vec<String>,
    pub dobjstr: String,
    pub prep: PrepSpec,
    pub prepstr: String,
    pub iobjstr: String,
}

/// Tokenizes a raw command line into the pieces described by spec.md §4.6 steps 2-3: `verb` is
/// the first word, `argstr` the remainder of the line, `args` the remaining words (honoring
/// double-quoted substrings and backslash escapes), and the dobj/iobj strings split on the first
/// matched preposition.
#[must_use]
pub fn parse_command_line(line: &str) -> ParsedCommand {
    let words = tokenize_words(line);
    if words.is_empty() {
        return ParsedCommand {
            verb: String::new(),
            argstr: String::new(),
            args: vec![],
            dobjstr: String::new(),
            prep: PrepSpec::None,
            prepstr: String::new(),
            iobjstr: String::new(),
        };
    }
    let verb = words[0].clone();
    let argstr = line.splitn(2, char::is_whitespace).nth(1).unwrap_or("").trim().to_string();
    let args = words[1..].to_vec();
    let word_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    match Preposition::find_in(&word_refs) {
        Some((start, end, p)) => {
            let dobjstr = args[..start].join(" ");
            let prepstr = args[start..end].join(" ");
            let iobjstr = args[end..].join(" ");
            ParsedCommand {
                verb,
                argstr,
                args,
                dobjstr,
                prep: PrepSpec::Specific(p),
                prepstr,
                iobjstr,
            }
        }
        None => ParsedCommand {
            dobjstr: args.join(" "),
            verb,
            argstr,
            args,
            prep: PrepSpec::None,
            prepstr: String::new(),
            iobjstr: String::new(),
        },
    }
}

/// Splits a line into words, honoring double-quoted substrings (the quotes are stripped, and
/// whitespace inside them does not split) and a backslash as an escape for the following
/// character (spec.md §4.6 step 2).
#[must_use]
pub fn tokenize_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    let mut has_content = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    cur.push(next);
                    has_content = true;
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                has_content = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_content {
                    words.push(std::mem::take(&mut cur));
                    has_content = false;
                }
            }
            c => {
                cur.push(c);
                has_content = true;
            }
        }
    }
    if has_content {
        words.push(cur);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_preposition() {
        let p = parse_command_line("put ball in box");
        assert_eq!(p.verb, "put");
        assert_eq!(p.dobjstr, "ball");
        assert_eq!(p.prep, PrepSpec::Specific(Preposition::In));
        assert_eq!(p.iobjstr, "box");
    }

    #[test]
    fn no_preposition_joins_args() {
        let p = parse_command_line("look here now");
        assert_eq!(p.dobjstr, "here now");
        assert_eq!(p.prep, PrepSpec::None);
        assert_eq!(p.iobjstr, "");
    }

    #[test]
    fn multiword_preposition_wins() {
        let p = parse_command_line("stand in front of mirror");
        assert_eq!(p.dobjstr, "");
        assert_eq!(p.prep, PrepSpec::Specific(Preposition::InFrontOf));
        assert_eq!(p.iobjstr, "mirror");
    }

    #[test]
    fn quoted_strings_stay_whole() {
        let words = tokenize_words(r#"say "hello there" now"#);
        assert_eq!(words, vec!["say", "hello there", "now"]);
    }
}
