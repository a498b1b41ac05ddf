//! Archetype expansion.
//!
//! Runs on the linked entity list and produces a new one:
//!
//! 1. fields, computed fields and invariants of every `extends` archetype
//!    are merged into the entity
//! 2. entities with a semantic `archetype:` kind get their structural flags
//! 3. with exactly one tenant root, tenant-scoped entities get a required
//!    reference to it
//!
//! [`generate_archetype_surfaces`] synthesizes default screens for the same
//! archetype kinds.

use std::collections::HashSet;

use crate::ir::{
    AccessSpec, ArchetypeKind, ArchetypeSpec, EntitySpec, FieldModifier, FieldSpec, FieldType,
    RelationKind, RelationType, SurfaceAccessSpec, SurfaceElement, SurfaceMode, SurfaceSection,
    SurfaceSpec,
};
use crate::linker::SymbolTable;

pub fn expand(entities: &[EntitySpec], symbols: &SymbolTable) -> Vec<EntitySpec> {
    let merged: Vec<EntitySpec> = entities
        .iter()
        .map(|entity| merge_archetypes(entity, symbols))
        .map(apply_kind)
        .collect();
    let expanded = inject_tenant_keys(merged);
    tracing::debug!(entities = expanded.len(), "expanded archetypes");
    expanded
}

fn merge_archetypes(entity: &EntitySpec, symbols: &SymbolTable) -> EntitySpec {
    if entity.extends.is_empty() {
        return entity.clone();
    }
    let archetypes: Vec<&ArchetypeSpec> = entity
        .extends
        .iter()
        .filter_map(|name| symbols.archetypes.get(name))
        .collect();

    let mut taken: HashSet<&str> = entity
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .chain(entity.computed_fields.iter().map(|c| c.name.as_str()))
        .collect();

    let mut fields = Vec::new();
    let mut computed = Vec::new();
    let mut invariants = Vec::new();
    for archetype in &archetypes {
        for field in &archetype.fields {
            if taken.insert(field.name.as_str()) {
                fields.push(field.clone());
            }
        }
        for field in &archetype.computed_fields {
            if taken.insert(field.name.as_str()) {
                computed.push(field.clone());
            }
        }
        invariants.extend(archetype.invariants.iter().cloned());
    }
    fields.extend(entity.fields.iter().cloned());
    computed.extend(entity.computed_fields.iter().cloned());
    invariants.extend(entity.invariants.iter().cloned());

    tracing::debug!(
        entity = %entity.name,
        archetypes = archetypes.len(),
        "merged archetype fields"
    );
    entity
        .clone()
        .with_fields(fields)
        .with_computed_fields(computed)
        .with_invariants(invariants)
}

fn apply_kind(entity: EntitySpec) -> EntitySpec {
    match entity.archetype_kind {
        Some(ArchetypeKind::Settings | ArchetypeKind::TenantSettings) => {
            let entity = EntitySpec {
                is_singleton: true,
                ..entity
            };
            if entity.access.is_some() {
                entity
            } else {
                entity.with_access(AccessSpec::admin_only())
            }
        }
        Some(ArchetypeKind::Tenant) => EntitySpec {
            is_tenant_root: true,
            ..entity
        },
        Some(ArchetypeKind::User | ArchetypeKind::UserMembership) | None => entity,
    }
}

fn inject_tenant_keys(entities: Vec<EntitySpec>) -> Vec<EntitySpec> {
    let mut roots = entities.iter().filter(|e| e.is_tenant_root);
    let (Some(root), None) = (roots.next(), roots.next()) else {
        return entities;
    };
    let tenant = root.name.clone();
    let key = lower_camel(&tenant);

    entities
        .into_iter()
        .map(|entity| {
            let exempt = entity.name == tenant
                || matches!(
                    entity.archetype_kind,
                    Some(ArchetypeKind::Settings | ArchetypeKind::User)
                );
            if exempt
                || entity.references().any(|(_, target)| target == tenant)
                || entity.has_field(&key)
            {
                return entity;
            }
            tracing::debug!(entity = %entity.name, field = %key, "injected tenant key");
            let tenant_ref = FieldSpec::new(
                key.clone(),
                FieldType::Relation(RelationType::new(RelationKind::Ref, tenant.clone())),
            )
            .with_modifier(FieldModifier::Required);
            let mut fields = Vec::with_capacity(entity.fields.len() + 1);
            fields.push(tenant_ref);
            fields.extend(entity.fields.iter().cloned());
            entity.with_fields(fields)
        })
        .collect()
}

/// Default surfaces for entities with a semantic archetype kind. Surfaces
/// whose names are already taken by `existing` are not generated.
pub fn generate_archetype_surfaces(
    entities: &[EntitySpec],
    existing: &[SurfaceSpec],
) -> Vec<SurfaceSpec> {
    let mut taken: HashSet<String> = existing.iter().map(|s| s.name.clone()).collect();
    let mut generated = Vec::new();
    for entity in entities {
        let Some(kind) = entity.archetype_kind else {
            continue;
        };
        let modes: &[(&str, SurfaceMode)] = match kind {
            ArchetypeKind::Settings | ArchetypeKind::TenantSettings => &[("edit", SurfaceMode::Edit)],
            ArchetypeKind::Tenant => &[("list", SurfaceMode::List)],
            ArchetypeKind::User => &[
                ("list", SurfaceMode::List),
                ("detail", SurfaceMode::View),
                ("create", SurfaceMode::Create),
                ("edit", SurfaceMode::Edit),
            ],
            ArchetypeKind::UserMembership => {
                &[("list", SurfaceMode::List), ("edit", SurfaceMode::Edit)]
            }
        };
        let base = snake_case(&entity.name);
        for (suffix, mode) in modes {
            let name = format!("{}_{}", base, suffix);
            if !taken.insert(name.clone()) {
                tracing::debug!(surface = %name, "kept declared surface");
                continue;
            }
            generated.push(surface_for(entity, kind, name, *mode));
        }
    }
    generated
}

fn surface_for(entity: &EntitySpec, kind: ArchetypeKind, name: String, mode: SurfaceMode) -> SurfaceSpec {
    let entity_title = entity.title.clone().unwrap_or_else(|| entity.name.clone());
    let title = match mode {
        SurfaceMode::List => format!("{} List", entity_title),
        SurfaceMode::View => format!("{} Details", entity_title),
        SurfaceMode::Create => format!("New {}", entity_title),
        SurfaceMode::Edit | SurfaceMode::Custom => format!("Edit {}", entity_title),
    };
    let elements = entity
        .fields
        .iter()
        .filter(|f| shown(f, mode))
        .map(|f| SurfaceElement {
            field_name: f.name.clone(),
            label: Some(label(&f.name)),
        })
        .collect();

    let mut surface = SurfaceSpec::new(name, mode, entity.loc.clone());
    surface.title = Some(title);
    surface.entity_ref = Some(entity.name.clone());
    surface.sections = vec![SurfaceSection {
        name: "main".into(),
        title: None,
        elements,
    }];
    if matches!(kind, ArchetypeKind::Settings | ArchetypeKind::TenantSettings) {
        surface.access = Some(SurfaceAccessSpec {
            require_auth: true,
            allow_personas: vec!["admin".into()],
            deny_personas: Vec::new(),
        });
    }
    surface
}

/// Generated fields are never keys or timestamps; forms also leave out
/// sensitive values.
fn shown(field: &FieldSpec, mode: SurfaceMode) -> bool {
    if field.has(FieldModifier::Pk)
        || field.has(FieldModifier::AutoAdd)
        || field.has(FieldModifier::AutoUpdate)
    {
        return false;
    }
    !(matches!(mode, SurfaceMode::List | SurfaceMode::View) && field.has(FieldModifier::Sensitive))
}

fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn label(field: &str) -> String {
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::build_symbol_table;
    use crate::parser::parse_module;

    fn expand_source(src: &str) -> Vec<EntitySpec> {
        let module = parse_module(src, "m.dsl").expect("parse");
        let symbols = build_symbol_table(&[&module]).expect("symbols");
        expand(&module.fragment.entities, &symbols)
    }

    fn field_names(entity: &EntitySpec) -> Vec<&str> {
        entity.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn own_field_wins_over_archetype() {
        let src = "\
archetype Timestamped:
  created_at: datetime auto_add
  updated_at: datetime auto_update

entity Task:
  extends: Timestamped
  id: uuid pk
  created_at: datetime required
";
        let entities = expand_source(src);
        let task = &entities[0];
        assert_eq!(field_names(task), vec!["updated_at", "id", "created_at"]);
        let created = task.get_field("created_at").unwrap();
        assert!(created.has(FieldModifier::Required));
        assert!(!created.has(FieldModifier::AutoAdd));
    }

    #[test]
    fn expansion_leaves_input_untouched() {
        let module = parse_module(
            "archetype Named:\n  name: str(100) required\n\nentity Tag:\n  extends: Named\n  id: uuid pk\n",
            "m.dsl",
        )
        .unwrap();
        let symbols = build_symbol_table(&[&module]).unwrap();
        let before = module.fragment.entities.clone();
        let after = expand(&module.fragment.entities, &symbols);
        assert_eq!(module.fragment.entities, before);
        assert_eq!(field_names(&after[0]), vec!["name", "id"]);
        assert_eq!(field_names(&before[0]), vec!["id"]);
    }

    #[test]
    fn unknown_archetype_is_skipped() {
        let entities = expand_source("entity Tag:\n  extends: Missing\n  id: uuid pk\n");
        assert_eq!(field_names(&entities[0]), vec!["id"]);
    }

    #[test]
    fn settings_become_admin_singletons() {
        let entities = expand_source("entity AppSettings:\n  archetype: settings\n  id: uuid pk\n  theme: str(20)\n");
        let settings = &entities[0];
        assert!(settings.is_singleton);
        assert_eq!(settings.access, Some(AccessSpec::admin_only()));
    }

    #[test]
    fn tenant_key_injection() {
        let src = "\
entity Organization:
  archetype: tenant
  id: uuid pk
  name: str(200) required

entity Project:
  id: uuid pk
  title: str(200) required

entity Member:
  archetype: user
  id: uuid pk
  email: email required

entity Invoice:
  id: uuid pk
  org: ref Organization required
";
        let entities = expand_source(src);
        assert!(entities[0].is_tenant_root);
        assert_eq!(field_names(&entities[0]), vec!["id", "name"]);

        let project = &entities[1];
        assert_eq!(field_names(project), vec!["organization", "id", "title"]);
        let key = project.get_field("organization").unwrap();
        assert_eq!(key.reference_target(), Some("Organization"));
        assert!(key.has(FieldModifier::Required));

        assert_eq!(field_names(&entities[2]), vec!["id", "email"]);
        assert_eq!(field_names(&entities[3]), vec!["id", "org"]);
    }

    #[test]
    fn two_tenant_roots_inject_nothing() {
        let src = "\
entity A:
  archetype: tenant
  id: uuid pk

entity B:
  archetype: tenant
  id: uuid pk

entity C:
  id: uuid pk
";
        let entities = expand_source(src);
        assert_eq!(field_names(&entities[2]), vec!["id"]);
    }

    #[test]
    fn user_surfaces_skip_declared_names() {
        let src = "\
entity TeamMember:
  archetype: user
  id: uuid pk
  email: email required
  password_hash: str(200) sensitive
  created_at: datetime auto_add

surface team_member_list \"People\":
  uses entity TeamMember
  mode: list
";
        let module = parse_module(src, "m.dsl").unwrap();
        let generated =
            generate_archetype_surfaces(&module.fragment.entities, &module.fragment.surfaces);
        let names: Vec<&str> = generated.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["team_member_detail", "team_member_create", "team_member_edit"]
        );

        let detail = &generated[0];
        assert_eq!(detail.mode, SurfaceMode::View);
        assert_eq!(detail.entity_ref.as_deref(), Some("TeamMember"));
        assert_eq!(detail.field_names().collect::<Vec<_>>(), vec!["email"]);

        let create = &generated[1];
        assert_eq!(create.field_names().collect::<Vec<_>>(), vec!["email", "password_hash"]);
        assert_eq!(create.sections[0].elements[1].label.as_deref(), Some("Password Hash"));
    }

    #[test]
    fn settings_surface_is_admin_only() {
        let module = parse_module(
            "entity SiteSettings:\n  archetype: settings\n  id: uuid pk\n  motd: text\n",
            "m.dsl",
        )
        .unwrap();
        let generated = generate_archetype_surfaces(&module.fragment.entities, &[]);
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].name, "site_settings_edit");
        let access = generated[0].access.as_ref().unwrap();
        assert_eq!(access.allow_personas, vec!["admin"]);
    }

    #[test]
    fn names() {
        assert_eq!(lower_camel("TenantAccount"), "tenantAccount");
        assert_eq!(snake_case("TenantAccount"), "tenant_account");
        assert_eq!(label("created_at"), "Created At");
    }
}
