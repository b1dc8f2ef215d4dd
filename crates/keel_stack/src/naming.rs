//! Stack names and resource tags.

use std::collections::BTreeMap;

/// Tag carrying the project name.
pub const PROJECT_TAG_KEY: &str = "keel-project";
/// Tag carrying the environment name.
pub const ENV_TAG_KEY: &str = "keel-environment";
/// Tag carrying the application name.
pub const APP_TAG_KEY: &str = "keel-application";

/// Stack holding an environment's shared infrastructure.
pub fn env_stack_name(project: &str, env: &str) -> String {
    format!("{}-{}", project, env)
}

/// Stack holding one application deployed to one environment.
pub fn app_stack_name(project: &str, env: &str, app: &str) -> String {
    format!("{}-{}-{}", project, env, app)
}

/// Tags identifying which project, environment and application a stack belongs to.
pub fn stack_tags(project: &str, env: &str, app: Option<&str>) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert(PROJECT_TAG_KEY.to_string(), project.to_string());
    tags.insert(ENV_TAG_KEY.to_string(), env.to_string());
    if let Some(app) = app {
        tags.insert(APP_TAG_KEY.to_string(), app.to_string());
    }
    tags
}
