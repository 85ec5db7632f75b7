// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Handling
//!
//! Translates broker deliveries into `EventMessage`s and hands them to the
//! receiver callback. Translation is lenient: missing or malformed properties
//! fall back to the `EventMessage` defaults instead of failing the delivery.

use crate::{channel::InboundDelivery, message::EventMessage, otel};
use lapin::protocol::basic::AMQPProperties;
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Callback invoked once per received message.
pub type EventMessageCallback = Arc<dyn Fn(EventMessage) + Send + Sync + 'static>;

/// Converts a delivery into an event message.
///
/// - the routing key becomes the topic
/// - the correlation id property is parsed as a UUID, nil when absent or invalid
/// - the timestamp property becomes the timestamp, 0 when absent
/// - the type property becomes the event type
/// - the payload becomes the body
pub(crate) fn to_event_message(delivery: InboundDelivery) -> EventMessage {
    let props = &delivery.properties;

    EventMessage {
        topic: delivery.routing_key,
        correlation_id: correlation_id(props),
        timestamp: props.timestamp().as_ref().map_or(0, |ts| *ts as i64),
        event_type: props.kind().as_ref().map(|kind| kind.to_string()),
        body: delivery.data,
    }
}

fn correlation_id(props: &AMQPProperties) -> Uuid {
    match props.correlation_id() {
        Some(value) => Uuid::parse_str(value.as_str()).unwrap_or_else(|_| {
            debug!(
                correlation_id = value.as_str(),
                "unparsable correlation id, using nil"
            );
            Uuid::nil()
        }),
        None => Uuid::nil(),
    }
}

/// Converts `delivery` and invokes `callback` with it inside a consumer span.
///
/// A panicking callback is logged and recorded on the span; the delivery was
/// already acknowledged, so it is not redelivered.
pub(crate) fn consume(
    tracer: &BoxedTracer,
    delivery: InboundDelivery,
    callback: &EventMessageCallback,
) {
    let (_ctx, mut span) = otel::new_span(&delivery.properties, tracer, &delivery.routing_key);

    let msg = to_event_message(delivery);
    debug!(
        "received: {} - correlation id: {}",
        msg.topic, msg.correlation_id
    );

    match catch_unwind(AssertUnwindSafe(|| callback(msg))) {
        Ok(()) => span.set_status(Status::Ok),
        Err(_) => {
            warn!("message callback panicked");
            span.set_status(Status::error("message callback panicked"));
        }
    }

    span.end();
}
