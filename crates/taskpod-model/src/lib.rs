mod domain;
pub use domain::{
    ARG_ENTRYPOINT, ARG_HERMETIC, ARG_ON_ERROR, ARG_POST_FILE, ARG_RESULTS, ARG_SEPARATOR,
    ARG_STEP_INDEX, ARG_STEP_NAME, ARG_STEP_RESULTS, ARG_TIMEOUT_MS, ARG_WAIT_FILE,
    ARTIFACTS_DIR, BIN_DIR, CREDENTIALS_DIR, ENTRYPOINT_BIN, HOME_DIR, LABEL_RUN_NAME,
    LABEL_TASK_NAME, RESULTS_DIR, RUN_DIR, RUN_OUT_FILE, SCRIPTS_DIR, STEPS_DIR, WORKSPACE_DIR,
    run_out_file, run_state_dir, step_results_dir, task_result_path, workspace_volume_name,
};
pub use domain::{Env, Flag, KeyValue, Labels, TimeoutMs};

mod error;
pub use error::{ModelError, ModelResult};

mod param;
pub use param::{Param, ParamSpec, ParamValue};

mod step;
pub use step::{OnError, Sidecar, Step, StepTemplate};

mod result;
pub use result::ResultSpec;

mod task;
pub use task::TaskSpec;

mod workspace;
pub use workspace::{WorkspaceBinding, WorkspaceDeclaration};

mod context;
pub use context::RunContext;

pub mod pod;
pub use pod::{
    Container, ContainerRestartPolicy, Pod, PodSecurityContext, PodSpec, PodTemplate,
    SecurityContext, Toleration, Volume, VolumeMount, VolumeSource,
};
