//! Wikitext generation for organization pages.

use crate::dataset::Record;

pub const CREATE_COMMENT: &str =
    "[[페미위키:단체 활동 기록 프로젝트]]의 일환으로 일괄 생성한 문서입니다.";
pub const DEFAULT_REGION: &str = "대한민국";
pub const OFFICIAL_LINKS_TEMPLATE: &str = "{{공식 링크}}";

/// Tag → category appended when the tag is present.
pub const TAG_CATEGORIES: [(&str, &str); 2] = [
    ("페미니즘", "[[분류:성격/페미니즘 단체]]"),
    ("퀴어", "[[분류:성격/성소수자 단체]]"),
];

const HANGUL_SYLLABLE_FIRST: u32 = 0xAC00;
const HANGUL_SYLLABLE_LAST: u32 = 0xD7A3;
const FINAL_CONSONANT_SLOTS: u32 = 28;
const PRIME: char = '\'';

/// Page title for a record: `fullName` if set, else `name`, with `/` and `#`
/// removed and angle brackets turned into a prime mark.
pub fn document_title(record: &Record) -> String {
    let base = if record.full_name.is_empty() {
        &record.name
    } else {
        &record.full_name
    };
    base.chars()
        .filter(|ch| !matches!(ch, '/' | '#'))
        .map(|ch| if matches!(ch, '<' | '>') { PRIME } else { ch })
        .collect()
}

/// Whether the last character is a Hangul syllable with a final consonant.
/// Non-Hangul endings count as consonant-final.
pub fn has_final_consonant(text: &str) -> bool {
    match text.chars().last().map(u32::from) {
        Some(code) if (HANGUL_SYLLABLE_FIRST..=HANGUL_SYLLABLE_LAST).contains(&code) => {
            (code - HANGUL_SYLLABLE_FIRST) % FINAL_CONSONANT_SLOTS != 0
        }
        _ => true,
    }
}

/// Topic particle for `text`: 은 after a final consonant, 는 otherwise.
pub fn topic_particle(text: &str) -> &'static str {
    if has_final_consonant(text) {
        "은"
    } else {
        "는"
    }
}

/// Lead sentence, official links template and tag categories.
pub fn page_source(record: &Record, title: &str) -> String {
    let tags = record.tag_list();
    let linked_tags = tags
        .iter()
        .map(|tag| format!("[[{tag}]]"))
        .collect::<Vec<_>>()
        .join(", ");
    let linked_tags = if linked_tags.is_empty() {
        linked_tags
    } else {
        format!("{linked_tags} ")
    };
    let affiliation = if record.school.is_empty() {
        &record.region
    } else {
        &record.school
    };
    let affiliation = if affiliation.is_empty() {
        DEFAULT_REGION.to_string()
    } else {
        format!("[[{affiliation}]]")
    };

    let mut source = format!(
        "'''{name}'''{particle} {affiliation}의 {linked_tags}단체이다.\n\n{OFFICIAL_LINKS_TEMPLATE}",
        name = record.name,
        particle = topic_particle(title),
    );
    for (tag, category) in TAG_CATEGORIES {
        if tags.contains(&tag) {
            source.push('\n');
            source.push_str(category);
        }
    }
    source
}
