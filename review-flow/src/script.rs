use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::{
    conversation::{Answers, Choice, ConversationStep},
    error::{FlowError, Result},
};

/// Turns the complete answer set into the session's final document. Must be pure.
pub type Finalizer = Arc<dyn Fn(&[ConversationStep], &Answers) -> FinalDocument + Send + Sync>;

const ARCHITECTURE_IMAGE_URL: &str = "https://media2.dev.to/dynamic/image/width=800%2Cheight=%2Cfit=scale-down%2Cgravity=auto%2Cformat=auto/https%3A%2F%2Fdev-to-uploads.s3.amazonaws.com%2Fuploads%2Farticles%2Fzi0z7w07jyxx0x7we05e.png";

/// Index of the security question in [`architecture_assistant`]
pub const WAF_STEP: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalDocument {
    pub title: String,
    pub components: Vec<String>,
    pub documentation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl FinalDocument {
    fn from_components(title: &str, components: Vec<String>, image_url: Option<&str>) -> Self {
        let mut documentation = format!("{}:", title);
        for component in &components {
            documentation.push_str("\n- ");
            documentation.push_str(component);
        }
        Self {
            title: title.to_string(),
            components,
            documentation,
            image_url: image_url.map(str::to_string),
        }
    }
}

/// An ordered list of steps plus the function producing the final document
#[derive(Clone)]
pub struct ConversationScript {
    name: String,
    steps: Vec<ConversationStep>,
    finalizer: Finalizer,
}

#[derive(Deserialize)]
struct ScriptFile {
    name: String,
    steps: Vec<ConversationStep>,
}

impl ConversationScript {
    pub fn new<F>(name: impl Into<String>, steps: Vec<ConversationStep>, finalizer: F) -> Result<Self>
    where
        F: Fn(&[ConversationStep], &Answers) -> FinalDocument + Send + Sync + 'static,
    {
        if steps.is_empty() {
            return Err(FlowError::EmptyScript);
        }
        Ok(Self {
            name: name.into(),
            steps,
            finalizer: Arc::new(finalizer),
        })
    }

    /// Script from YAML (`name` plus a list of steps). Its final document lists the answers.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: ScriptFile = serde_yaml::from_str(yaml)?;
        Self::new(file.name, file.steps, summarize_answers)
    }

    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml_str(&content)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[ConversationStep] {
        &self.steps
    }

    pub fn finalize(&self, answers: &Answers) -> FinalDocument {
        (self.finalizer)(&self.steps, answers)
    }
}

impl std::fmt::Debug for ConversationScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationScript")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish()
    }
}

fn said_yes(answers: &Answers, step: usize) -> bool {
    answers.get(&step) == Some(&Choice::Yes)
}

/// The canned AWS solution architect interview
pub fn architecture_assistant() -> ConversationScript {
    let steps = vec![
        ConversationStep::new("Will the workload serve traffic from the public internet?")
            .on_yes("Then an Application Load Balancer in public subnets will front the service.")
            .on_no("Understood, everything stays in private subnets behind a VPN."),
        ConversationStep::new("Do you expect traffic spikes that need automatic scaling?")
            .on_yes("I'll put the EC2 tier into an Auto Scaling Group."),
        ConversationStep::new("Should the web tier be protected by AWS WAF?")
            .on_yes("Good call, AWS WAF with managed rule groups goes in front of the load balancer."),
        ConversationStep::new("Do you need a managed relational database?")
            .on_yes("Adding RDS for PostgreSQL in a private subnet.")
            .on_no("Fine, data and static assets will live in S3."),
        ConversationStep::new("Is high availability across availability zones required?")
            .on_yes("Everything will be deployed across multiple AZs.")
            .on_no("A single-AZ deployment keeps costs down.")
            .labels("Yes, multi-AZ", "Single AZ is fine"),
    ];

    ConversationScript {
        name: "aws-architecture".to_string(),
        steps,
        finalizer: Arc::new(finalize_architecture),
    }
}

fn finalize_architecture(_steps: &[ConversationStep], answers: &Answers) -> FinalDocument {
    let public = said_yes(answers, 0);
    let mut components = Vec::new();

    if public {
        components.push("VPC with public/private subnets".to_string());
        components.push("Application Load Balancer".to_string());
    } else {
        components.push("VPC with private subnets and site-to-site VPN".to_string());
    }

    if said_yes(answers, 1) {
        components.push("Auto Scaling Group for EC2".to_string());
    } else {
        components.push("Fixed-size EC2 fleet".to_string());
    }

    if said_yes(answers, WAF_STEP) {
        components.push("AWS WAF with managed rule groups in front of the load balancer".to_string());
    } else if public {
        components.push("Security groups only, no web application firewall on the public endpoint".to_string());
    } else {
        components.push("Security groups only".to_string());
    }

    if said_yes(answers, 3) {
        components.push("RDS (PostgreSQL) in private subnet".to_string());
    }
    components.push("S3 for static assets".to_string());
    components.push("IAM roles for least privilege".to_string());
    components.push("CloudWatch monitoring".to_string());

    if said_yes(answers, 4) {
        components.push("Multi-AZ deployment for high availability".to_string());
    } else {
        components.push("Single-AZ deployment".to_string());
    }

    FinalDocument::from_components(
        "AWS Solution Architecture",
        components,
        Some(ARCHITECTURE_IMAGE_URL),
    )
}

/// Generic final document: one line per step with the chosen label
pub fn summarize_answers(steps: &[ConversationStep], answers: &Answers) -> FinalDocument {
    let components = steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let answer = answers
                .get(&i)
                .map(|choice| step.label(*choice))
                .unwrap_or("(unanswered)");
            format!("{} {}", step.prompt, answer)
        })
        .collect();

    FinalDocument::from_components("Summary of answers", components, None)
}
