use sb_sweep::SweepProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStage {
    CheckingCache,
    LoadedFromCache,
    Sweeping,
    WritingArtifact,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanProgressEvent {
    pub stage: PlanStage,
    /// Zero-based position of the current pair in the plan.
    pub pair_index: usize,
    pub pair_count: usize,
    pub model: Option<String>,
    pub executable: Option<String>,
    pub elapsed_wall_s: f64,
    pub sweep: Option<SweepProgress>,
    pub message: Option<String>,
}

impl PlanProgressEvent {
    pub fn stage(
        stage: PlanStage,
        pair_index: usize,
        pair_count: usize,
        elapsed_wall_s: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            stage,
            pair_index,
            pair_count,
            model: None,
            executable: None,
            elapsed_wall_s,
            sweep: None,
            message,
        }
    }

    pub fn for_pair(mut self, model: &str, executable: &str) -> Self {
        self.model = Some(model.to_string());
        self.executable = Some(executable.to_string());
        self
    }
}
