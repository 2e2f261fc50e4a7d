use std::fmt::Display;

/// The step of the scaling pipeline a status message refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    LoadingProject,
    AssigningBatches,
    Sorting,
    Scaling,
    Rescaling,
    RefiningSd,
    SavingProject,
    Done,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LoadingProject => "Loading project",
            Self::AssigningBatches => "Assigning batches",
            Self::Sorting => "Sorting reflections",
            Self::Scaling => "Scaling",
            Self::Rescaling => "Scaling sorted reflections",
            Self::RefiningSd => "Refining SD corrections",
            Self::SavingProject => "Saving project",
            Self::Done => "Done",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessStatus {
    pub progress: f32,
    pub crystal: String,
    pub stage: Stage,
}

impl ProcessStatus {
    pub fn new(progress: f32, crystal: &str, stage: Stage) -> Self {
        Self {
            progress,
            crystal: crystal.to_string(),
            stage,
        }
    }
}
