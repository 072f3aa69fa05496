//! Keyword answers for the questions the frontend asks most often.
//!
//! Rules are checked in order. The first rule whose trigger appears in the question is the only
//! one evaluated: when its context condition fails no later rule is consulted.

use regex::Regex;
use std::sync::LazyLock;

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?7\s?\d{3}\s?\d{3}\s?\d{4}").expect("phone pattern is valid")
});

type Responder = fn(context: &str, context_lower: &str) -> Option<String>;

struct KeywordRule {
    triggers: &'static [&'static str],
    respond: Responder,
}

static RULES: &[KeywordRule] = &[
    KeywordRule {
        triggers: &["компания", "что это", "company", "what is this"],
        respond: company,
    },
    KeywordRule {
        triggers: &["телефон", "номер", "phone", "number"],
        respond: phone,
    },
    KeywordRule {
        triggers: &["услуги", "предоставляет", "services", "provide"],
        respond: services,
    },
    KeywordRule {
        triggers: &["qr код", "qr code"],
        respond: qr_code,
    },
    KeywordRule {
        triggers: &["акция", "сертификат", "promotion", "certificate"],
        respond: certificate,
    },
];

fn company(_context: &str, lower: &str) -> Option<String> {
    if lower.contains("kazkomp") {
        return Some("KAZKOMP.KZ - computer hardware store".into());
    }
    let store = lower.contains("магазин") || lower.contains("store");
    let computer = lower.contains("компьютерной") || lower.contains("computer");
    (store && computer).then(|| "This is a computer hardware store".into())
}

fn phone(context: &str, _lower: &str) -> Option<String> {
    PHONE_RE
        .find(context)
        .map(|found| format!("Phone number: {}", found.as_str()))
}

fn services(_context: &str, lower: &str) -> Option<String> {
    (lower.contains("магазин компьютерной техники") || lower.contains("computer hardware store"))
        .then(|| "The company sells computer hardware".into())
}

fn qr_code(_context: &str, lower: &str) -> Option<String> {
    (lower.contains("qr") || lower.contains("код") || lower.contains("code"))
        .then(|| "Yes, the image contains a QR code for Instagram".into())
}

fn certificate(_context: &str, lower: &str) -> Option<String> {
    let certificate = lower.contains("сертификат") || lower.contains("certificate");
    let tenge = lower.contains("тенге") || lower.contains("tenge");
    (certificate && tenge)
        .then(|| "A certificate worth 10,000-20,000 tenge is offered on the next order".into())
}

/// Answer `question` from the keyword table, or `None` when no rule produces an answer.
pub fn keyword_answer(question: &str, context: &str) -> Option<String> {
    let question = question.to_lowercase();
    let rule = RULES.iter().find(|rule| {
        rule.triggers
            .iter()
            .any(|trigger| question.contains(trigger))
    })?;
    (rule.respond)(context, &context.to_lowercase())
}
