use crate::schema::RowKind;
use serde::{Deserialize, Serialize};

/// Which identifying fields of a normalized row are non-empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPresence {
    pub department: bool,
    pub class: bool,
    pub category: bool,
    pub code: bool,
    pub description: bool,
}

/// One entry of the precedence table.
pub struct ClassificationRule {
    pub kind: RowKind,
    pub description: &'static str,
    pub matches: fn(&FieldPresence) -> bool,
}

fn is_department(p: &FieldPresence) -> bool {
    p.department && !p.class
}

fn is_class(p: &FieldPresence) -> bool {
    p.class && !p.category
}

fn is_category(p: &FieldPresence) -> bool {
    p.category && !p.description && !p.code
}

fn is_article(p: &FieldPresence) -> bool {
    p.description && p.code
}

/// Evaluated top to bottom; the first matching rule wins.
pub const CLASSIFICATION_RULES: [ClassificationRule; 4] = [
    ClassificationRule {
        kind: RowKind::Department,
        description: "department present, class absent",
        matches: is_department,
    },
    ClassificationRule {
        kind: RowKind::Class,
        description: "class present, category absent",
        matches: is_class,
    },
    ClassificationRule {
        kind: RowKind::Category,
        description: "category present, description and code absent",
        matches: is_category,
    },
    ClassificationRule {
        kind: RowKind::Article,
        description: "description and code present",
        matches: is_article,
    },
];

/// The first rule that matches, or `None` for an unknown row.
pub fn matching_rule(presence: &FieldPresence) -> Option<&'static ClassificationRule> {
    CLASSIFICATION_RULES.iter().find(|rule| (rule.matches)(presence))
}

pub fn classify(presence: &FieldPresence) -> RowKind {
    matching_rule(presence).map_or(RowKind::Unknown, |rule| rule.kind)
}
