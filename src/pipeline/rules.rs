//! Heuristic extraction rules.
//!
//! Every rule is a pure `fn(&str) -> Option<String>`. Rules are grouped into
//! ordered cascades per field; the extractor reduces a cascade with
//! first-match-wins semantics (`first_match`). Nothing here can fail: a rule
//! that does not apply returns `None`.

use std::sync::LazyLock;

use regex::Regex;

/// A single extraction heuristic.
pub type Rule = fn(&str) -> Option<String>;

/// Body rules that mine a recruiter name, in priority order.
pub const NAME_RULES: &[Rule] = &[name_after_signoff, name_before_role_marker, name_from_signature_tail];

/// Body rules that may override the domain-derived company, in priority order.
pub const COMPANY_RULES: &[Rule] = &[
    company_after_preposition_with_suffix,
    company_with_suffix,
    company_after_representing,
];

/// Subject rules for the job title, in priority order.
pub const POSITION_RULES: &[Rule] = &[position_from_keyword_window, position_from_title_pattern];

/// Body rules for the job location, in priority order.
pub const LOCATION_RULES: &[Rule] = &[
    location_city_state_code,
    location_city_state_name,
    location_remote,
    location_area,
    location_known_place,
];

/// Run a cascade and return the first hit.
pub fn first_match(rules: &[Rule], text: &str) -> Option<String> {
    rules.iter().find_map(|rule| rule(text))
}

// ── Vocabulary ──────────────────────────────────────────────────────

/// Job keywords searched in the subject, in priority order.
const JOB_KEYWORDS: &[&str] = &[
    "engineer", "developer", "manager", "director", "analyst", "specialist", "coordinator",
    "lead", "senior", "junior", "architect", "consultant", "designer", "scientist", "principal",
    "software", "backend", "frontend", "fullstack", "devops", "data", "ml", "ai",
    "machine learning", "python", "javascript", "react", "node", "java", "golang", "rust", "scala",
];

/// Domain labels that never name an employer.
const NON_COMPANY_LABELS: &[&str] = &[
    "gmail", "googlemail", "yahoo", "hotmail", "outlook", "live", "msn", "aol", "icloud", "me",
    "protonmail", "proton", "mail", "email", "hr", "talent", "recruiting", "recruitment",
    "careers", "jobs",
];

/// Closing salutations; also rejected as names.
const SIGNOFF_WORDS: &[&str] = &[
    "best", "regards", "thanks", "thank", "cheers", "sincerely", "from", "warm", "kind", "hi",
    "hello", "dear", "you",
];

/// Words that make a "for <Phrase>" capture a job title rather than an employer.
const TITLE_WORDS: &[&str] = &[
    "engineer", "developer", "manager", "director", "position", "role", "opportunity", "senior",
    "lead", "team",
];

/// Signature lines containing any of these are contact details, not names.
const SIGNATURE_NOISE: &[&str] = &["@", "http", "www", ".com", "phone", "mobile", "office"];

const US_STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

/// Well-known places, matched on word boundaries, with their display form.
const KNOWN_PLACES: &[(&str, &str)] = &[
    ("san francisco", "San Francisco"),
    ("sf", "San Francisco"),
    ("bay area", "Bay Area"),
    ("silicon valley", "Silicon Valley"),
    ("new york", "New York"),
    ("nyc", "New York"),
    ("seattle", "Seattle"),
    ("austin", "Austin"),
    ("denver", "Denver"),
    ("boston", "Boston"),
    ("chicago", "Chicago"),
    ("los angeles", "Los Angeles"),
    ("la", "Los Angeles"),
];

// ── Patterns ────────────────────────────────────────────────────────

const CAPITALIZED_PHRASE: &str = r"[A-Z][a-zA-Z&]*(?:[ \t]+[A-Z&][a-zA-Z&]*)*?";
const CORPORATE_SUFFIX: &str = r"(?:Inc|LLC|Corp|Company|Technologies|Systems|Solutions)";

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("extraction rule pattern must compile")
}

static SIGNOFF_NAME: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?m)^[ \t]*(?i:best regards|kind regards|warm regards|best wishes|thank you|best|regards|thanks|cheers|sincerely|from),?[ \t]*\r?\n[ \t]*([A-Z][a-zA-Z'\-]+(?:[ \t]+[A-Z][a-zA-Z'\-]+)*)[ \t]*\r?$",
    )
});

static ROLE_MARKER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?m)^[ \t]*([A-Z][a-zA-Z'\-]+(?:[ \t]+[A-Z][a-zA-Z'\-]+){0,3})[ \t]*\r?\n[ \t]*(?:(?:Senior|Sr\.?|Lead|Technical)[ \t]+)*(?:Recruiter|Recruiting|Talent|HR|Human Resources)\b",
    )
});

static COMPANY_AFTER_PREPOSITION: LazyLock<Regex> = LazyLock::new(|| {
    regex(&format!(
        r"\b(?i:from|at|with)[ \t]+({CAPITALIZED_PHRASE}[ \t]+{CORPORATE_SUFFIX})\b"
    ))
});

static COMPANY_WITH_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| regex(&format!(r"\b({CAPITALIZED_PHRASE}[ \t]+{CORPORATE_SUFFIX})\b")));

static COMPANY_AFTER_REPRESENTING: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\b(?i:representing|for)[ \t]+([A-Z][a-zA-Z&]*(?:[ \t]+[A-Z&][a-zA-Z&]*)*)")
});

static TITLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(?:senior|sr\.?|principal|lead|staff)\s+\w+\s+(?:engineer|developer)\b",
        r"\b(?:full[\s-]?stack|back[\s-]?end|front[\s-]?end)\s+(?:engineer|developer)\b",
        r"\b(?:software|web|mobile)\s+(?:engineer|developer)\b",
        r"\b(?:data|ml|ai)\s+(?:engineer|scientist)\b",
        r"\b(?:devops|sre|platform)\s+engineer\b",
    ]
    .into_iter()
    .map(regex)
    .collect()
});

static CITY_STATE_CODE: LazyLock<Regex> =
    LazyLock::new(|| regex(r"\b([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)*),[ \t]*([A-Z]{2})\b"));

static CITY_STATE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"\b([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)*),[ \t]*(Alabama|Alaska|Arizona|Arkansas|California|Colorado|Connecticut|Delaware|Florida|Georgia|Hawaii|Idaho|Illinois|Indiana|Iowa|Kansas|Kentucky|Louisiana|Maine|Maryland|Massachusetts|Michigan|Minnesota|Mississippi|Missouri|Montana|Nebraska|Nevada|New Hampshire|New Jersey|New Mexico|New York|North Carolina|North Dakota|Ohio|Oklahoma|Oregon|Pennsylvania|Rhode Island|South Carolina|South Dakota|Tennessee|Texas|Utah|Vermont|Virginia|Washington|West Virginia|Wisconsin|Wyoming)\b",
    )
});

static REMOTE: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)\bremote\b"));

static AREA: LazyLock<Regex> =
    LazyLock::new(|| regex(r"\b([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)*)[ \t]+(?i:area)\b"));

static KNOWN_PLACE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    KNOWN_PLACES
        .iter()
        .map(|(keyword, display)| (regex(&format!(r"(?i)\b{keyword}\b")), *display))
        .collect()
});

// ── Name rules ──────────────────────────────────────────────────────

/// Name on the line right after a closing salutation (`Best regards,\nJane Doe`).
pub fn name_after_signoff(body: &str) -> Option<String> {
    SIGNOFF_NAME
        .captures_iter(body)
        .find_map(|caps| validate_name(&caps[1]))
}

/// Name on the line right before a role marker (`Jane Doe\nTechnical Recruiter`).
pub fn name_before_role_marker(body: &str) -> Option<String> {
    ROLE_MARKER_NAME
        .captures_iter(body)
        .find_map(|caps| validate_name(&caps[1]))
}

/// Last short run of capitalized words near the end of the body.
pub fn name_from_signature_tail(body: &str) -> Option<String> {
    let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let tail = &lines[lines.len().saturating_sub(5)..];

    tail.iter().rev().find_map(|line| {
        let lower = line.to_lowercase();
        if SIGNATURE_NOISE.iter().any(|noise| lower.contains(noise)) {
            return None;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if !(1..=3).contains(&words.len()) || !words.iter().all(|w| is_capitalized_word(w)) {
            return None;
        }
        validate_name(&words.join(" "))
    })
}

/// 2–50 characters, no digits, not a salutation.
fn validate_name(candidate: &str) -> Option<String> {
    let name = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
    let len = name.chars().count();
    if !(2..=50).contains(&len) || name.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let is_salutation = name
        .split_whitespace()
        .all(|w| SIGNOFF_WORDS.contains(&w.to_lowercase().trim_end_matches(',')));
    (!is_salutation).then_some(name)
}

fn is_capitalized_word(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            chars.all(|c| c.is_alphabetic() || matches!(c, '-' | '\'' | '.'))
        }
        _ => false,
    }
}

// ── Company rules ───────────────────────────────────────────────────

/// Employer name derived from the sender's address.
///
/// `jane@acme-labs.com` → `Acme Labs`; `jane@talent.acme.com` → `Acme`.
/// Personal-mail providers and generic labels give `None`.
pub fn company_from_address(address: &str) -> Option<String> {
    let (_, domain) = address.rsplit_once('@')?;
    let domain = domain.trim().to_lowercase();
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();

    let mut label = *labels.first()?;
    if NON_COMPANY_LABELS.contains(&label) {
        if labels.len() <= 2 {
            return None;
        }
        label = labels[1];
        if NON_COMPANY_LABELS.contains(&label) {
            return None;
        }
    }

    let name = title_case(&label.replace(['-', '_'], " "));
    (!name.is_empty()).then_some(name)
}

/// `... at Acme Labs Inc ...` → `Acme Labs Inc`.
pub fn company_after_preposition_with_suffix(body: &str) -> Option<String> {
    COMPANY_AFTER_PREPOSITION
        .captures(body)
        .map(|caps| caps[1].trim().to_string())
}

/// `... Startup Inc is hiring ...` → `Startup Inc`.
pub fn company_with_suffix(body: &str) -> Option<String> {
    COMPANY_WITH_SUFFIX
        .captures(body)
        .map(|caps| caps[1].trim().to_string())
}

/// `... representing Globex ...` → `Globex`. Job-title phrases are ignored.
pub fn company_after_representing(body: &str) -> Option<String> {
    COMPANY_AFTER_REPRESENTING.captures_iter(body).find_map(|caps| {
        let phrase = caps[1].trim();
        let looks_like_title = phrase
            .split_whitespace()
            .any(|w| TITLE_WORDS.contains(&w.to_lowercase().as_str()));
        (!looks_like_title).then(|| phrase.to_string())
    })
}

// ── Position rules ──────────────────────────────────────────────────

/// Four-word window around the first job keyword found in the subject.
pub fn position_from_keyword_window(subject: &str) -> Option<String> {
    let words: Vec<&str> = subject.split_whitespace().collect();
    let tokens: Vec<String> = words.iter().map(|w| normalize_token(w)).collect();

    let index = JOB_KEYWORDS
        .iter()
        .find_map(|keyword| find_keyword(&tokens, keyword))?;

    let start = index.saturating_sub(2);
    let end = (index + 2).min(words.len());
    let title = strip_punctuation(&words[start..end].join(" "));
    (!title.is_empty()).then_some(title)
}

/// Common title shapes over the lower-cased subject, title-cased.
pub fn position_from_title_pattern(subject: &str) -> Option<String> {
    let lower = subject.to_lowercase();
    TITLE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.find(&lower))
        .map(|m| title_case(m.as_str()))
}

/// Index of the first token matching `keyword`.
///
/// Short keywords (`ml`, `ai`) must match a whole token so they do not hit
/// words like "email"; multi-word keywords must match consecutive tokens.
fn find_keyword(tokens: &[String], keyword: &str) -> Option<usize> {
    let parts: Vec<&str> = keyword.split_whitespace().collect();
    if parts.len() > 1 {
        return tokens
            .windows(parts.len())
            .position(|window| window.iter().zip(&parts).all(|(t, p)| t == p));
    }
    tokens.iter().position(|token| {
        if keyword.len() <= 3 {
            token == keyword
        } else {
            token.contains(keyword)
        }
    })
}

fn normalize_token(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

// ── Location rules ──────────────────────────────────────────────────

/// `Austin, TX` with a real US state code.
pub fn location_city_state_code(body: &str) -> Option<String> {
    CITY_STATE_CODE.captures_iter(body).find_map(|caps| {
        US_STATE_CODES
            .contains(&&caps[2])
            .then(|| format!("{}, {}", &caps[1], &caps[2]))
    })
}

/// `Austin, Texas`.
pub fn location_city_state_name(body: &str) -> Option<String> {
    CITY_STATE_NAME
        .captures(body)
        .map(|caps| format!("{}, {}", &caps[1], &caps[2]))
}

/// The word "remote" anywhere.
pub fn location_remote(body: &str) -> Option<String> {
    REMOTE.is_match(body).then(|| "Remote".to_string())
}

/// `Bay Area`, `Greater Boston area`.
pub fn location_area(body: &str) -> Option<String> {
    AREA.captures(body).map(|caps| format!("{} Area", &caps[1]))
}

/// First well-known city or region mentioned.
pub fn location_known_place(body: &str) -> Option<String> {
    KNOWN_PLACE_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(body))
        .map(|(_, display)| display.to_string())
}

// ── Text helpers ────────────────────────────────────────────────────

/// Uppercase the first letter of every word, lowercase the rest.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Drop everything but word characters and whitespace, then collapse spaces.
fn strip_punctuation(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
