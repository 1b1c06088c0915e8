//! Datahub protobuf messages and gRPC client
//!
//! Hand-maintained prost definitions for the subset of the Datahub
//! `v1alpha1` API the admission controller calls. Field tags follow the
//! published `.proto` files; unused fields are left out and skipped by the
//! decoder.

pub mod datahub {
    pub mod v1alpha1 {
        use prost::Message;

        #[derive(Clone, PartialEq, Message)]
        pub struct ObjectMeta {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(string, tag = "2")]
            pub namespace: String,
            #[prost(string, tag = "3")]
            pub node_name: String,
            #[prost(string, tag = "4")]
            pub cluster_name: String,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum Kind {
            Undefined = 0,
            Deployment = 1,
            Deploymentconfig = 2,
            Statefulset = 3,
        }

        impl Kind {
            pub fn as_str_name(&self) -> &'static str {
                match self {
                    Kind::Undefined => "KIND_UNDEFINED",
                    Kind::Deployment => "DEPLOYMENT",
                    Kind::Deploymentconfig => "DEPLOYMENTCONFIG",
                    Kind::Statefulset => "STATEFULSET",
                }
            }
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum MetricType {
            Undefined = 0,
            CpuUsageSecondsPercentage = 1,
            MemoryUsageBytes = 2,
            PowerUsageWatts = 3,
            TemperatureCelsius = 4,
            DutyCycle = 5,
        }

        impl MetricType {
            pub fn as_str_name(&self) -> &'static str {
                match self {
                    MetricType::Undefined => "METRICS_TYPE_UNDEFINED",
                    MetricType::CpuUsageSecondsPercentage => "CPU_USAGE_SECONDS_PERCENTAGE",
                    MetricType::MemoryUsageBytes => "MEMORY_USAGE_BYTES",
                    MetricType::PowerUsageWatts => "POWER_USAGE_WATTS",
                    MetricType::TemperatureCelsius => "TEMPERATURE_CELSIUS",
                    MetricType::DutyCycle => "DUTY_CYCLE",
                }
            }
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct TimeRange {
            #[prost(message, optional, tag = "1")]
            pub start_time: Option<prost_types::Timestamp>,
            #[prost(message, optional, tag = "2")]
            pub end_time: Option<prost_types::Timestamp>,
            #[prost(message, optional, tag = "3")]
            pub step: Option<prost_types::Duration>,
            #[prost(message, optional, tag = "5")]
            pub apply_time: Option<prost_types::Timestamp>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct QueryCondition {
            #[prost(message, optional, tag = "1")]
            pub time_range: Option<TimeRange>,
            #[prost(enumeration = "query_condition::Order", tag = "2")]
            pub order: i32,
            #[prost(uint64, tag = "3")]
            pub limit: u64,
        }

        pub mod query_condition {
            #[derive(
                Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
            )]
            #[repr(i32)]
            pub enum Order {
                None = 0,
                Asc = 1,
                Desc = 2,
            }
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct Sample {
            #[prost(message, optional, tag = "1")]
            pub time: Option<prost_types::Timestamp>,
            #[prost(message, optional, tag = "2")]
            pub end_time: Option<prost_types::Timestamp>,
            #[prost(string, tag = "3")]
            pub num_value: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct MetricData {
            #[prost(enumeration = "MetricType", tag = "1")]
            pub metric_type: i32,
            #[prost(message, repeated, tag = "2")]
            pub data: Vec<Sample>,
            #[prost(int64, tag = "3")]
            pub granularity: i64,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerRecommendation {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(message, repeated, tag = "2")]
            pub limit_recommendations: Vec<MetricData>,
            #[prost(message, repeated, tag = "3")]
            pub request_recommendations: Vec<MetricData>,
            #[prost(message, repeated, tag = "4")]
            pub initial_limit_recommendations: Vec<MetricData>,
            #[prost(message, repeated, tag = "5")]
            pub initial_request_recommendations: Vec<MetricData>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct TopController {
            #[prost(message, optional, tag = "1")]
            pub object_meta: Option<ObjectMeta>,
            #[prost(enumeration = "Kind", tag = "2")]
            pub kind: i32,
            #[prost(int32, tag = "3")]
            pub replicas: i32,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodRecommendation {
            #[prost(message, optional, tag = "1")]
            pub object_meta: Option<ObjectMeta>,
            #[prost(bool, tag = "2")]
            pub apply_recommendation_now: bool,
            #[prost(message, repeated, tag = "4")]
            pub container_recommendations: Vec<ContainerRecommendation>,
            #[prost(message, optional, tag = "5")]
            pub start_time: Option<prost_types::Timestamp>,
            #[prost(message, optional, tag = "6")]
            pub end_time: Option<prost_types::Timestamp>,
            #[prost(message, optional, tag = "7")]
            pub top_controller: Option<TopController>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ListPodRecommendationsRequest {
            #[prost(message, repeated, tag = "1")]
            pub object_meta: Vec<ObjectMeta>,
            #[prost(message, optional, tag = "2")]
            pub query_condition: Option<QueryCondition>,
            #[prost(enumeration = "Kind", tag = "3")]
            pub kind: i32,
        }

        /// `google.rpc.Status`
        #[derive(Clone, PartialEq, Message)]
        pub struct Status {
            #[prost(int32, tag = "1")]
            pub code: i32,
            #[prost(string, tag = "2")]
            pub message: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ListPodRecommendationsResponse {
            #[prost(message, optional, tag = "1")]
            pub status: Option<Status>,
            #[prost(message, repeated, tag = "2")]
            pub pod_recommendations: Vec<PodRecommendation>,
        }

        pub mod datahub_service_client {
            use super::*;
            use tonic::codegen::*;
            use tonic::transport::Uri;

            #[derive(Debug, Clone)]
            pub struct DatahubServiceClient<T> {
                inner: tonic::client::Grpc<T>,
            }

            impl DatahubServiceClient<tonic::transport::Channel> {
                pub fn new(channel: tonic::transport::Channel) -> Self {
                    let inner = tonic::client::Grpc::new(channel);
                    Self { inner }
                }
            }

            impl<T> DatahubServiceClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::BoxBody>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + Send,
            {
                pub fn with_origin(inner: T, origin: Uri) -> Self {
                    let inner = tonic::client::Grpc::with_origin(inner, origin);
                    Self { inner }
                }

                pub async fn list_available_pod_recommendations(
                    &mut self,
                    request: impl tonic::IntoRequest<ListPodRecommendationsRequest>,
                ) -> Result<tonic::Response<ListPodRecommendationsResponse>, tonic::Status>
                {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/containersai.alameda.v1alpha1.datahub.DatahubService/ListAvailablePodRecommendations",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }
            }
        }
    }
}

pub use datahub::v1alpha1::datahub_service_client::DatahubServiceClient;
pub use datahub::v1alpha1::*;
