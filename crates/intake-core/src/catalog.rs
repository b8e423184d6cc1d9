//! Static field catalog: the per-topic source of truth for column names.
//!
//! The catalog drives both the schema evolver (which columns a topic table
//! must have) and the persistence writer (which keys are accepted). It is
//! configuration data, compiled in and versioned with the code.

use tracing::warn;

/// Storage kind for a catalog field. Both map to TEXT columns; the kind
/// documents intent and bounds what the extraction prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    ShortText,
    LongText,
}

/// One canonical field: name plus storage kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn short(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::ShortText,
    }
}

const fn long(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::LongText,
    }
}

/// The field catalog for one topic, mapped to one destination table.
#[derive(Debug, Clone, Copy)]
pub struct TopicCatalog {
    /// Topic label as stored on sessions (e.g. "personal").
    pub topic: &'static str,
    /// Destination table name (e.g. "intake_personal").
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
}

impl TopicCatalog {
    /// Catalog fields whose names pass the identifier check.
    ///
    /// Unsafe names are dropped with a warning and never reach DDL or DML.
    pub fn safe_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| {
            if is_safe_identifier(f.name) {
                true
            } else {
                warn!(field = f.name, topic = self.topic, "Dropping unsafe catalog field name");
                false
            }
        })
    }

    /// Whether `name` is a known, safe field of this topic.
    pub fn contains(&self, name: &str) -> bool {
        is_safe_identifier(name) && self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.safe_fields().map(|f| f.name).collect()
    }
}

/// Syntactically safe SQL identifier: letters/digits/underscore, not
/// starting with a digit, non-empty.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The full ordered catalog. Topic order here is the conversation order.
#[derive(Debug, Clone)]
pub struct Catalog {
    topics: Vec<TopicCatalog>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// The built-in bariatric-intake catalog.
    pub fn builtin() -> Self {
        Self {
            topics: BUILTIN_TOPICS.to_vec(),
        }
    }

    /// Topics in conversation order.
    pub fn topics(&self) -> &[TopicCatalog] {
        &self.topics
    }

    /// Look up a topic catalog by topic label.
    pub fn topic(&self, label: &str) -> Option<&TopicCatalog> {
        self.topics.iter().find(|t| t.topic == label)
    }

    /// The topic a canonical field name belongs to, if any.
    pub fn topic_of(&self, field: &str) -> Option<&TopicCatalog> {
        self.topics.iter().find(|t| t.contains(field))
    }

    /// First topic in the sequence (the default for new sessions).
    pub fn first_topic(&self) -> &'static str {
        self.topics.first().map(|t| t.topic).unwrap_or("personal")
    }

    /// All known field names across every topic, in topic order.
    pub fn all_field_names(&self) -> Vec<&'static str> {
        self.topics
            .iter()
            .flat_map(|t| t.field_names())
            .collect()
    }
}

static BUILTIN_TOPICS: &[TopicCatalog] = &[
    TopicCatalog {
        topic: "personal",
        table: "intake_personal",
        fields: &[
            short("first_name"),
            short("last_name"),
            short("birth_date"),
            short("gender"),
            short("id_number"),
            short("occupation"),
        ],
    },
    TopicCatalog {
        topic: "contact",
        table: "intake_contact",
        fields: &[
            short("phone"),
            short("email"),
            short("address"),
            short("city"),
            short("country"),
        ],
    },
    TopicCatalog {
        topic: "surgical_interest",
        table: "intake_surgical_interest",
        fields: &[
            short("procedure_of_interest"),
            long("motivation"),
            long("previous_consultations"),
        ],
    },
    TopicCatalog {
        topic: "weight_history",
        table: "intake_weight_history",
        fields: &[
            short("current_weight_kg"),
            short("height_cm"),
            short("max_weight_kg"),
            short("min_adult_weight_kg"),
            long("weight_changes"),
        ],
    },
    TopicCatalog {
        topic: "medical_history",
        table: "intake_medical_history",
        fields: &[
            short("diabetes"),
            short("hypertension"),
            short("heart_disease"),
            short("respiratory_disease"),
            short("gastrointestinal_disease"),
            short("thyroid_disease"),
            long("other_conditions"),
        ],
    },
    TopicCatalog {
        topic: "psychiatric",
        table: "intake_psychiatric",
        fields: &[
            short("psychiatric_diagnosis"),
            short("psychiatric_treatment"),
            long("psychiatric_notes"),
        ],
    },
    TopicCatalog {
        topic: "social_history",
        table: "intake_social_history",
        fields: &[
            short("smoking"),
            short("alcohol"),
            short("drugs"),
            short("physical_activity"),
        ],
    },
    TopicCatalog {
        topic: "medications",
        table: "intake_medications",
        fields: &[
            long("current_medications"),
            short("anticoagulants"),
            long("supplements"),
        ],
    },
    TopicCatalog {
        topic: "allergies",
        table: "intake_allergies",
        fields: &[
            long("drug_allergies"),
            long("food_allergies"),
            long("other_allergies"),
        ],
    },
    TopicCatalog {
        topic: "surgical_history",
        table: "intake_surgical_history",
        fields: &[
            long("previous_surgeries"),
            short("anesthesia_complications"),
            short("transfusions"),
        ],
    },
    TopicCatalog {
        topic: "emergency_contact",
        table: "intake_emergency_contact",
        fields: &[
            short("emergency_contact_name"),
            short("emergency_contact_phone"),
            short("emergency_contact_relation"),
        ],
    },
    TopicCatalog {
        topic: "terms",
        table: "intake_terms",
        fields: &[short("terms_accepted")],
    },
];
