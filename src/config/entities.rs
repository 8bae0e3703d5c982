//! Built-in entity model: families, generations, genotypes, plants, environments, mediums, journals.

use crate::config::types::*;

fn text(name: &str) -> AttributeConfig {
    AttributeConfig {
        name: name.into(),
        type_: AttributeType::Text,
        required: false,
        default: DefaultValue::EmptyString,
        allowed: None,
        references: None,
    }
}

fn required_text(name: &str) -> AttributeConfig {
    AttributeConfig {
        required: true,
        ..text(name)
    }
}

fn one_of(name: &str, values: &[&str], required: bool) -> AttributeConfig {
    AttributeConfig {
        name: name.into(),
        type_: AttributeType::Text,
        required,
        default: DefaultValue::Null,
        allowed: Some(values.iter().map(|v| v.to_string()).collect()),
        references: None,
    }
}

fn reference(name: &str, entity: &str, required: bool, on_delete: OnDelete, cascade_create: bool) -> AttributeConfig {
    AttributeConfig {
        name: name.into(),
        type_: AttributeType::Integer,
        required,
        default: DefaultValue::Null,
        allowed: None,
        references: Some(ReferenceConfig {
            entity: entity.into(),
            on_delete,
            cascade_create,
        }),
    }
}

fn entity(name: &str, plural: &str, prefix: &str) -> EntityConfig {
    EntityConfig {
        name: name.into(),
        plural: plural.into(),
        table: plural.into(),
        id: format!("{}Id", prefix),
        created_at: format!("{}CreatedAt", prefix),
        modified_at: format!("{}ModifiedAt", prefix),
        attributes: Vec::new(),
        many_to_many: Vec::new(),
        one_to_many: Vec::new(),
        joins: Vec::new(),
        rules: Vec::new(),
    }
}

fn one_to_many(name: &str, entity: &str) -> OneToManyConfig {
    OneToManyConfig {
        name: name.into(),
        entity: entity.into(),
    }
}

pub const PLANT_SEXES: &[&str] = &["male", "female", "hermaphrodite"];

pub const JOURNAL_TYPES: &[&str] = &["log", "watering", "feeding", "training", "harvest", "measurement"];

/// The model every table in `sql/schema.sql` is declared for.
pub fn default_config() -> FullConfig {
    let family = EntityConfig {
        attributes: vec![required_text("familyName"), text("familyDescription")],
        one_to_many: vec![one_to_many("familyGenerations", "Generation")],
        joins: vec!["Generation".into()],
        ..entity("Family", "families", "family")
    };

    let generation = EntityConfig {
        attributes: vec![
            required_text("generationName"),
            text("generationDescription"),
            reference("familyId", "Family", true, OnDelete::Cascade, true),
        ],
        many_to_many: vec![ManyToManyConfig {
            name: "generationParents".into(),
            join_table: "generation_parents".into(),
            our_key: "generationId".into(),
            their_key: "plantId".into(),
            entity: "Plant".into(),
        }],
        one_to_many: vec![one_to_many("generationGenotypes", "Genotype")],
        joins: vec!["Family".into(), "Genotype".into()],
        ..entity("Generation", "generations", "generation")
    };

    let genotype = EntityConfig {
        attributes: vec![
            text("genotypeName"),
            text("genotypeDescription"),
            reference("generationId", "Generation", true, OnDelete::Cascade, true),
        ],
        one_to_many: vec![one_to_many("genotypePlants", "Plant")],
        joins: vec!["Generation".into(), "Family".into(), "Plant".into()],
        ..entity("Genotype", "genotypes", "genotype")
    };

    let plant = EntityConfig {
        attributes: vec![
            required_text("plantName"),
            text("plantDescription"),
            one_of("plantSex", PLANT_SEXES, false),
            reference("plantClonedFrom", "Plant", false, OnDelete::SetNull, false),
            reference("genotypeId", "Genotype", true, OnDelete::Cascade, true),
            reference("mediumId", "Medium", false, OnDelete::Cascade, false),
        ],
        joins: vec![
            "Genotype".into(),
            "Generation".into(),
            "Family".into(),
            "Medium".into(),
            "Environment".into(),
        ],
        ..entity("Plant", "plants", "plant")
    };

    let environment = EntityConfig {
        attributes: vec![required_text("environmentName"), text("environmentDescription")],
        one_to_many: vec![one_to_many("environmentMediums", "Medium")],
        joins: vec!["Medium".into()],
        ..entity("Environment", "environments", "environment")
    };

    let medium = EntityConfig {
        attributes: vec![
            required_text("mediumName"),
            text("mediumDescription"),
            reference("environmentId", "Environment", false, OnDelete::Cascade, false),
        ],
        one_to_many: vec![one_to_many("mediumPlants", "Plant")],
        joins: vec!["Environment".into(), "Plant".into()],
        ..entity("Medium", "mediums", "medium")
    };

    let journal = EntityConfig {
        attributes: vec![
            one_of("journalType", JOURNAL_TYPES, true),
            AttributeConfig {
                name: "journalValue".into(),
                type_: AttributeType::Json,
                required: true,
                default: DefaultValue::Null,
                allowed: None,
                references: None,
            },
            reference("plantId", "Plant", false, OnDelete::Cascade, false),
            reference("mediumId", "Medium", false, OnDelete::Cascade, false),
            reference("environmentId", "Environment", false, OnDelete::Cascade, false),
        ],
        joins: vec!["Plant".into(), "Medium".into(), "Environment".into()],
        rules: vec![EntityRule::ExactlyOneOf(vec![
            "plantId".into(),
            "mediumId".into(),
            "environmentId".into(),
        ])],
        ..entity("Journal", "journals", "journal")
    };

    FullConfig {
        entities: vec![family, generation, genotype, plant, environment, medium, journal],
    }
}
