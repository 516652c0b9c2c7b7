pub mod workload_autoscaler;

pub use workload_autoscaler::{
    AutoscalingPolicy, Phase, ReplicasRecommendation, WorkloadAutoscaler,
    WorkloadAutoscalerSpec, WorkloadAutoscalerStatus,
};
