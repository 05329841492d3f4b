//! Pipeline definition types.
//!
//! These types represent the user-authored `.convoy.yml` configuration:
//! stages of jobs, each job a list of shell commands run in one container.

use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineDefinition {
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageDefinition {
    pub name: String,
    pub jobs: Vec<JobDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobDefinition {
    pub name: String,
    /// One image, or several to fan the job out per image.
    pub image: OneOrMany<String>,
    /// One environment set, or several to fan the job out per set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSpec>,
    pub commands: OneOrMany<String>,
    /// Commands run in the same container when a main command failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_failure: Option<OneOrMany<String>>,
    /// Commands run in the same container regardless of the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finally: Option<OneOrMany<String>>,
}

/// A scalar or a list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(value: T) -> Self {
        OneOrMany::One(value)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

/// Environment variables for a job: a single map, or a list of maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum EnvSpec {
    Single(BTreeMap<String, EnvValue>),
    Matrix(Vec<BTreeMap<String, EnvValue>>),
}

/// YAML scalar accepted as an environment value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum EnvValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Bool(b) => write!(f, "{}", b),
            EnvValue::Integer(i) => write!(f, "{}", i),
            EnvValue::Float(x) => write!(f, "{}", x),
            EnvValue::Text(s) => f.write_str(s),
        }
    }
}

/// One concrete job after the image x environment expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobVariant {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub commands: Vec<String>,
    pub after_failure: Vec<String>,
    pub finally: Vec<String>,
}

impl PipelineDefinition {
    /// Parse and validate a pipeline from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("malformed YAML: {}", e)))?;
        Self::from_value(document)
    }

    /// Validate the document shape, then deserialize and validate the fields.
    pub fn from_value(document: serde_yaml::Value) -> Result<Self> {
        if document.is_null() {
            return Err(Error::Config("missing top-level 'stages'".to_string()));
        }
        if !document.is_mapping() {
            return Err(Error::Config(
                "pipeline document must be a mapping".to_string(),
            ));
        }

        let stages = document
            .get("stages")
            .ok_or_else(|| Error::Config("missing top-level 'stages'".to_string()))?;
        let stages = stages
            .as_sequence()
            .ok_or_else(|| Error::Config("'stages' must be a sequence".to_string()))?;

        for (idx, stage) in stages.iter().enumerate() {
            if stage.get("jobs").is_some_and(|jobs| jobs.is_mapping()) {
                return Err(Error::Config(format!(
                    "stage #{}: jobs keyed by name are no longer supported, \
                     use a list of jobs with a 'name' field",
                    idx + 1
                )));
            }
        }

        let definition: PipelineDefinition =
            serde_yaml::from_value(document).map_err(|e| Error::Config(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check the constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::Config("at least one stage is required".to_string()));
        }

        for (stage_idx, stage) in self.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(Error::Config(format!(
                    "stage #{} has an empty name",
                    stage_idx + 1
                )));
            }
            let stage_label = &stage.name;

            if stage.jobs.is_empty() {
                return Err(Error::Config(format!(
                    "stage '{}' must have at least one job",
                    stage_label
                )));
            }

            for (job_idx, job) in stage.jobs.iter().enumerate() {
                if job.name.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "stage '{}': job #{} has an empty name",
                        stage_label,
                        job_idx + 1
                    )));
                }
                job.validate()
                    .map_err(|msg| Error::Config(format!("job '{}': {}", job.name, msg)))?;
            }
        }

        Ok(())
    }

    /// JSON schema of the pipeline file.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineDefinition)
    }
}

impl JobDefinition {
    fn validate(&self) -> std::result::Result<(), String> {
        let images = self.image.to_vec();
        if images.is_empty() {
            return Err("at least one image is required".to_string());
        }
        if images.iter().any(|image| image.trim().is_empty()) {
            return Err("image names must not be empty".to_string());
        }

        check_commands("commands", Some(&self.commands))?;
        check_commands("after_failure", self.after_failure.as_ref())?;
        check_commands("finally", self.finally.as_ref())?;
        Ok(())
    }

    pub fn images(&self) -> Vec<String> {
        self.image.to_vec()
    }

    /// Environment sets, stringified. Always at least one (possibly empty) set.
    pub fn env_sets(&self) -> Vec<BTreeMap<String, String>> {
        let stringify = |vars: &BTreeMap<String, EnvValue>| {
            vars.iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };

        match &self.env {
            None => vec![BTreeMap::new()],
            Some(EnvSpec::Single(vars)) => vec![stringify(vars)],
            Some(EnvSpec::Matrix(sets)) if sets.is_empty() => vec![BTreeMap::new()],
            Some(EnvSpec::Matrix(sets)) => sets.iter().map(stringify).collect(),
        }
    }

    /// Expand into one variant per image x environment set, image-major.
    ///
    /// A job that does not fan out keeps its name unchanged.
    pub fn split(&self) -> Vec<JobVariant> {
        let images = self.images();
        let env_sets = self.env_sets();
        let fan_out = images.len() * env_sets.len() > 1;

        let commands = self.commands.to_vec();
        let after_failure = self
            .after_failure
            .as_ref()
            .map(OneOrMany::to_vec)
            .unwrap_or_default();
        let finally = self.finally.as_ref().map(OneOrMany::to_vec).unwrap_or_default();

        let mut variants = Vec::with_capacity(images.len() * env_sets.len());
        for image in &images {
            for env in &env_sets {
                let name = if fan_out {
                    variant_name(&self.name, image, env)
                } else {
                    self.name.clone()
                };
                variants.push(JobVariant {
                    name,
                    image: image.clone(),
                    env: env.clone(),
                    commands: commands.clone(),
                    after_failure: after_failure.clone(),
                    finally: finally.clone(),
                });
            }
        }
        variants
    }
}

fn check_commands(
    field: &str,
    commands: Option<&OneOrMany<String>>,
) -> std::result::Result<(), String> {
    let Some(commands) = commands else {
        return Ok(());
    };
    let commands = commands.to_vec();
    if commands.is_empty() {
        return Err(format!("'{}' must contain at least one command", field));
    }
    if commands.iter().any(|cmd| cmd.trim().is_empty()) {
        return Err(format!("'{}' contains an empty command", field));
    }
    Ok(())
}

fn variant_name(name: &str, image: &str, env: &BTreeMap<String, String>) -> String {
    let mut parts = vec![image.to_string()];
    parts.extend(env.iter().map(|(k, v)| format!("{}={}", k, v)));
    format!("{} [{}]", name, parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn job(image: OneOrMany<String>, env: Option<EnvSpec>) -> JobDefinition {
        JobDefinition {
            name: "test".to_string(),
            image,
            env,
            commands: OneOrMany::One("make test".to_string()),
            after_failure: None,
            finally: None,
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, EnvValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), EnvValue::Text(v.to_string())))
            .collect()
    }

    #[test]
    fn test_single_image_single_env_does_not_split() {
        let job = job(
            "python:3.12".to_string().into(),
            Some(EnvSpec::Single(vars(&[("A", "1")]))),
        );
        let variants = job.split();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].name, "test");
        assert_eq!(variants[0].env.get("A").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_images_by_env_sets() {
        let job = job(
            vec!["python:3.11".to_string(), "python:3.12".to_string()].into(),
            Some(EnvSpec::Matrix(vec![vars(&[("DB", "pg")]), vars(&[("DB", "mysql")])])),
        );
        let names: Vec<String> = job.split().into_iter().map(|v| v.name).collect();
        assert_eq!(
            names,
            vec![
                "test [python:3.11, DB=pg]",
                "test [python:3.11, DB=mysql]",
                "test [python:3.12, DB=pg]",
                "test [python:3.12, DB=mysql]",
            ]
        );
    }

    #[test]
    fn test_multiple_images_without_env() {
        let job = job(vec!["a".to_string(), "b".to_string()].into(), None);
        let variants = job.split();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[1].image, "b");
        assert!(variants[1].env.is_empty());
        assert_eq!(variants[1].commands, vec!["make test".to_string()]);
    }

    #[test]
    fn test_env_values_are_stringified() {
        let mut env = BTreeMap::new();
        env.insert("DEBUG".to_string(), EnvValue::Bool(true));
        env.insert("WORKERS".to_string(), EnvValue::Integer(4));
        let job = job("alpine".to_string().into(), Some(EnvSpec::Single(env)));
        let sets = job.env_sets();
        assert_eq!(sets[0].get("DEBUG").map(String::as_str), Some("true"));
        assert_eq!(sets[0].get("WORKERS").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let mut job = job("alpine".to_string().into(), None);
        job.commands = OneOrMany::Many(vec!["echo ok".to_string(), " ".to_string()]);
        let definition = PipelineDefinition {
            stages: vec![StageDefinition {
                name: "build".to_string(),
                jobs: vec![job],
            }],
        };
        let err = definition.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("empty command"));
    }
}
