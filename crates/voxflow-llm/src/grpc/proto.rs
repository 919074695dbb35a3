//! Wire types for the agent-runtime bidirectional stream
//!
//! Message layout mirrors the published `voxflow.agent` protobuf contract;
//! the client below matches what `tonic-build` would emit for
//! `rpc Talk(stream TalkRequest) returns (stream TalkResponse)`.

/// Assistant identity sent in the configuration frame
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssistantDefinition {
    #[prost(uint64, tag = "1")]
    pub assistant_id: u64,
    #[prost(string, tag = "2")]
    pub version: ::prost::alloc::string::String,
}

/// Negotiated audio stream shape
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioStreamConfig {
    #[prost(string, tag = "1")]
    pub encoding: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub sample_rate: u32,
    #[prost(uint32, tag = "3")]
    pub channels: u32,
}

/// First client message on the stream
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConversationConfiguration {
    #[prost(uint64, tag = "1")]
    pub conversation_id: u64,
    #[prost(message, optional, tag = "2")]
    pub assistant: ::core::option::Option<AssistantDefinition>,
    #[prost(map = "string, string", tag = "3")]
    pub args: ::std::collections::HashMap<
        ::prost::alloc::string::String,
        ::prost::alloc::string::String,
    >,
    #[prost(map = "string, string", tag = "4")]
    pub metadata: ::std::collections::HashMap<
        ::prost::alloc::string::String,
        ::prost::alloc::string::String,
    >,
    #[prost(map = "string, string", tag = "5")]
    pub options: ::std::collections::HashMap<
        ::prost::alloc::string::String,
        ::prost::alloc::string::String,
    >,
    #[prost(message, optional, tag = "6")]
    pub input_config: ::core::option::Option<AudioStreamConfig>,
    #[prost(message, optional, tag = "7")]
    pub output_config: ::core::option::Option<AudioStreamConfig>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextContent {
    #[prost(string, tag = "1")]
    pub content: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioContent {
    #[prost(bytes = "vec", tag = "1")]
    pub content: ::prost::alloc::vec::Vec<u8>,
}

/// One finalized user turn pushed upstream
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserMessage {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub completed: bool,
    /// Unix milliseconds
    #[prost(int64, tag = "3")]
    pub time: i64,
    #[prost(oneof = "user_message::Content", tags = "4, 5")]
    pub content: ::core::option::Option<user_message::Content>,
}

pub mod user_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        #[prost(message, tag = "4")]
        Text(super::TextContent),
        #[prost(message, tag = "5")]
        Audio(super::AudioContent),
    }
}

/// Assistant output, streamed or final
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssistantMessage {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub completed: bool,
    #[prost(oneof = "assistant_message::Content", tags = "4, 5")]
    pub content: ::core::option::Option<assistant_message::Content>,
}

pub mod assistant_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        #[prost(message, tag = "4")]
        Text(super::TextContent),
        #[prost(message, tag = "5")]
        Audio(super::AudioContent),
    }
}

/// Runtime-detected interruption
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Interruption {
    #[prost(string, tag = "1")]
    pub source: ::prost::alloc::string::String,
    #[prost(double, tag = "2")]
    pub start_at: f64,
    #[prost(double, tag = "3")]
    pub end_at: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TalkRequest {
    #[prost(oneof = "talk_request::Request", tags = "1, 2")]
    pub request: ::core::option::Option<talk_request::Request>,
}

pub mod talk_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        Configuration(super::ConversationConfiguration),
        #[prost(message, tag = "2")]
        Message(super::UserMessage),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TalkResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(uint32, tag = "2")]
    pub code: u32,
    #[prost(string, tag = "3")]
    pub error: ::prost::alloc::string::String,
    #[prost(oneof = "talk_response::Data", tags = "4, 5")]
    pub data: ::core::option::Option<talk_response::Data>,
}

pub mod talk_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "4")]
        Interruption(super::Interruption),
        #[prost(message, tag = "5")]
        Assistant(super::AssistantMessage),
    }
}

pub mod agent_talk_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct AgentTalkClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl AgentTalkClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> AgentTalkClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_encoding_message_size(limit);
            self
        }

        pub async fn talk(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::TalkRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::TalkResponse>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/voxflow.agent.AgentTalk/Talk");
            let mut req = request.into_streaming_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("voxflow.agent.AgentTalk", "Talk"));
            self.inner.streaming(req, path, codec).await
        }
    }
}
