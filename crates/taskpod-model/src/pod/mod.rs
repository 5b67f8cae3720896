//! Wire types for the pod specification the assembler produces.
//!
//! Field names follow the Kubernetes core/v1 JSON form so the produced pod
//! serializes directly into what an external caller submits to the cluster.
//! Only the fields this compiler actually sets are modeled.
mod container;
pub use container::{Container, ContainerRestartPolicy, SecurityContext};

mod volume;
pub use volume::{Volume, VolumeMount, VolumeSource};

mod spec;
pub use spec::{Pod, PodSpec};

mod template;
pub use template::{PodSecurityContext, PodTemplate, Toleration};
