use serde::Serialize;

use super::{JobScheduler, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Trigger,
}

impl std::str::FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            "restart" => Ok(ControlAction::Restart),
            "trigger" | "run" => Ok(ControlAction::Trigger),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// Acknowledgement returned by every control operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlAck {
    pub ok: bool,
    pub job: String,
    pub action: ControlAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlAck {
    fn new(job: &str, action: ControlAction, result: Result<JobStatus, String>) -> Self {
        match result {
            Ok(status) => Self { ok: true, job: job.to_string(), action, status: Some(status), error: None },
            Err(error) => Self { ok: false, job: job.to_string(), action, status: None, error: Some(error) },
        }
    }
}

impl JobScheduler {
    /// Applies `action` to `job`. Never fails: errors, including a failed
    /// triggered run, come back as `ok: false` with a reason.
    pub async fn control(&self, job: &str, action: ControlAction, schedule: Option<&str>) -> ControlAck {
        let result: Result<JobStatus, String> = match action {
            ControlAction::Start => self.start(job).map_err(|e| e.to_string()),
            ControlAction::Stop => self.stop(job).map_err(|e| e.to_string()),
            ControlAction::Restart => self.restart(job, schedule).map_err(|e| e.to_string()),
            ControlAction::Trigger => match self.trigger(job).await {
                Ok(run) => match run.error {
                    None => self.status(job).map_err(|e| e.to_string()),
                    Some(e) => Err(format!("run failed: {e}")),
                },
                Err(e) => Err(e.to_string()),
            },
        };
        ControlAck::new(job, action, result)
    }
}
