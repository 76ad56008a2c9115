use crudguard_core::{EntityConfig, EntityRules, RelationSchema};

/// `user` entity: posts (with comments) and country are joinable, password is hidden
#[allow(dead_code)]
pub fn user_config() -> EntityConfig {
    EntityConfig::new("user")
        .with_allowed_joins(["posts.comments", "country"])
        .with_default_joins(["country"])
        .with_forbidden_path("password")
        .with_forbidden_path("posts.comments.authorEmail")
        .with_scalars(["email", "name", "password", "tenantId"])
        .with_relation("posts", RelationSchema::to_many())
        .with_relation("country", RelationSchema::to_one())
}

#[allow(dead_code)]
pub fn user_rules() -> EntityRules {
    EntityRules::from_config(&user_config()).unwrap()
}
