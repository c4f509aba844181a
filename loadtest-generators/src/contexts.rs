//! Generators for the `contexts` and `user` interfaces of events.

use rand::{Rng, RngCore};
use serde_json::{Value, json};

use crate::error::GeneratorError;
use crate::schema::{FieldSpec, Schema};
use crate::util::{op_generator, span_id_generator, uuid_generator, version_generator};

/// Operating system context.
pub fn os_context_generator() -> Result<Schema, GeneratorError> {
    let schema = Schema::new()
        .field("type", "os")
        .field(
            "name",
            FieldSpec::one_of(["Windows", "Linux", "macOS", "iOS", "Android"]),
        )
        .field("version", version_generator(3, 15)?)
        .field("build", FieldSpec::one_of([None, Some("20G95"), Some("22621")]))
        .field(
            "kernel_version",
            FieldSpec::one_of([None, Some("5.15.0-1034"), Some("21.6.0")]),
        )
        .field("rooted", FieldSpec::one_of([None, Some(false), Some(true)]));
    Ok(schema)
}

/// Device context.
pub fn device_context_generator() -> Schema {
    Schema::new()
        .field("type", "device")
        .field(
            "family",
            FieldSpec::one_of(["iPhone", "iPad", "Pixel", "Galaxy", "Desktop"]),
        )
        .field(
            "model",
            FieldSpec::one_of(["iPhone14,2", "iPad13,4", "Pixel 7", "SM-G991B", "MacBookPro18,3"]),
        )
        .field("arch", FieldSpec::one_of(["arm64", "arm64e", "x86_64"]))
        .field(
            "battery_level",
            FieldSpec::producer(|rng| json!(rng.random_range(0.0..100.0))),
        )
        .field("orientation", FieldSpec::one_of(["portrait", "landscape"]))
        .field("simulator", FieldSpec::one_of([false, true]))
        .field(
            "memory_size",
            FieldSpec::producer(|rng| json!(rng.random_range(1u64..=16) * 1024 * 1024 * 1024)),
        )
}

/// Application context.
pub fn app_context_generator() -> Result<Schema, GeneratorError> {
    let schema = Schema::new()
        .field("type", "app")
        .field(
            "app_identifier",
            FieldSpec::one_of(["io.sentry.sample", "com.example.shop", "org.example.mail"]),
        )
        .field("app_name", FieldSpec::one_of(["Sample", "Shop", "Mail"]))
        .field("app_version", version_generator(3, 10)?)
        .field(
            "app_build",
            FieldSpec::producer(|rng| Value::from(rng.random_range(1..1000).to_string())),
        );
    Ok(schema)
}

/// Trace context linking an event to a trace.
///
/// With a fixed `trace_id` all payloads of this generator belong to the same trace, otherwise
/// every payload starts a new one.
pub fn trace_context_generator(trace_id: Option<String>) -> Schema {
    let trace_id = match trace_id {
        Some(trace_id) => FieldSpec::from(trace_id),
        None => uuid_generator(),
    };

    Schema::new()
        .field("type", "trace")
        .field("trace_id", trace_id)
        .field("span_id", span_id_generator())
        .field("op", op_generator())
        .field("status", "ok")
}

/// The `user` interface, drawn from a population of `max_users` distinct users.
///
/// Without a population the field is omitted.
pub fn user_interface_generator(max_users: Option<u32>) -> FieldSpec {
    match max_users {
        Some(max_users) if max_users > 0 => FieldSpec::producer(move |rng: &mut dyn RngCore| {
            let id = rng.random_range(0..max_users);
            json!({
                "id": id.to_string(),
                "username": format!("user{id}"),
                "email": format!("user{id}@example.com"),
                "ip_address": format!("10.{}.{}.{}", (id >> 16) & 0xff, (id >> 8) & 0xff, id & 0xff),
            })
        }),
        _ => FieldSpec::null(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::util::is_lower_hex;

    #[test]
    fn contexts_have_types() {
        let generator = Schema::new()
            .field("os", os_context_generator().unwrap())
            .field("device", device_context_generator())
            .field("app", app_context_generator().unwrap())
            .field("trace", trace_context_generator(None))
            .compile()
            .unwrap();

        let contexts = generator.generate();
        assert_eq!(contexts["os"]["type"], "os");
        assert_eq!(contexts["device"]["type"], "device");
        assert_eq!(contexts["app"]["type"], "app");
        assert_eq!(contexts["trace"]["type"], "trace");

        let battery = contexts["device"]["battery_level"].as_f64().unwrap();
        assert!((0.0..100.0).contains(&battery));
    }

    #[test]
    fn fixed_trace_id() {
        let generator = Schema::new()
            .field("trace", trace_context_generator(Some("abc".into())))
            .compile()
            .unwrap();

        for _ in 0..10 {
            let value = generator.generate();
            assert_eq!(value["trace"]["trace_id"], "abc");
            let span_id = value["trace"]["span_id"].as_str().unwrap();
            assert_eq!(span_id.len(), 16);
            assert!(is_lower_hex(span_id));
        }
    }

    #[test]
    fn users_come_from_a_bounded_population() {
        let generator = Schema::new()
            .field("user", user_interface_generator(Some(5)))
            .compile()
            .unwrap();

        let ids: HashSet<_> = (0..500)
            .map(|_| generator.generate()["user"]["id"].as_str().unwrap().to_owned())
            .collect();
        assert!(ids.len() <= 5);
        assert!(ids.iter().all(|id| id.parse::<u32>().unwrap() < 5));
    }

    #[test]
    fn no_population_omits_user() {
        for max_users in [None, Some(0)] {
            let generator = Schema::new()
                .field("user", user_interface_generator(max_users))
                .compile()
                .unwrap();
            assert!(!generator.generate().contains_key("user"));
        }
    }
}
