/*
    core_codec - Item <-> mapping codec

    Every mapping that crosses the process boundary goes through this module.
    The transport only carries plain JSON, so a mapping travels as an array of
    two-element `[key, value]` arrays:

    ```json
    { "insert": [["color", "blue"], ["size", "10"]], "delete": ["stale"] }
    { "items": [["color", "red"], ["gone", null]] }
    ```

    Incoming payloads are untyped `serde_json::Value`s. The `decode_*` functions
    are the trust boundary: they either produce the strict schema or fail with
    a `CodecError`.
*/

mod errors;
mod item;

pub use errors::{CodecError, CodecResult};
pub use item::{
    decode, decode_change_event, decode_snapshot, decode_update, decode_update_payload, encode,
    encode_update, ChangeEventPayload, Item, ItemsChangeEvent, UpdateItemsPayload, UpdateRequest,
};
