use crate::{error::Result, events::StorageEvent};

/// Render a human readable description of a notification, one tab-indented
/// line per attribute.
pub fn summarize(event: &StorageEvent) -> Result<String> {
    let mut output = String::new();
    output.push_str(&format!("\tEvent type: {}\n", event.event_type));
    output.push_str(&format!("\tBucket ID: {}\n", event.bucket_id));
    output.push_str(&format!("\tObject ID: {}\n", event.object_id));
    output.push_str(&format!("\tGeneration: {}\n", event.generation));

    if let Some(generation) = &event.overwrote_generation {
        output.push_str(&format!("\tOverwrote generation: {}\n", generation));
    }
    if let Some(generation) = &event.overwritten_by_generation {
        output.push_str(&format!("\tOverwritten by generation: {}\n", generation));
    }

    if let Some(payload) = event.object_payload()? {
        output.push_str(&format!("\tContent type: {}\n", payload.content_type));
        output.push_str(&format!("\tSize: {}\n", payload.size));
        output.push_str(&format!("\tMetageneration: {}\n", payload.metageneration));
    }

    Ok(output)
}
