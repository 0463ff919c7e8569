use rdkafka::error::{KafkaError, RDKafkaErrorCode};

/// Consume errors that end a group session. Anything else is transient:
/// log it and keep reading.
pub fn is_fatal(error: &KafkaError) -> bool {
    match error {
        KafkaError::MessageConsumptionFatal(_) | KafkaError::Subscription(_) => true,
        KafkaError::MessageConsumption(code) => matches!(
            code,
            RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::BrokerTransportFailure
                | RDKafkaErrorCode::Fatal
                | RDKafkaErrorCode::UnknownMemberId
                | RDKafkaErrorCode::IllegalGeneration
                | RDKafkaErrorCode::FencedInstanceId
        ),
        _ => false,
    }
}
