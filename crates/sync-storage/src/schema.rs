//! Diesel table definitions.
//!
//! Device and server binaries link the same `sync-storage` crate and use
//! disjoint subsets of these tables against their own SQLite files (teacher
//! analogue: one `storage-sqlite` crate serving both `apps/tauri` and
//! `apps/server`). `tasks`/`comments` are shared shape; `conflicts`,
//! `devices`, `sync_log` are server-only; `device_state` is device-only.

diesel::table! {
    tasks (id) {
        id -> Text,
        org_id -> Text,
        project_id -> Nullable<Text>,
        title -> Text,
        description -> Nullable<Text>,
        status -> Text,
        priority -> Text,
        due_date -> Nullable<Text>,
        completed_at -> Nullable<Text>,
        position -> Text,
        assigned_to -> Nullable<Text>,
        tags -> Text,
        custom_fields -> Text,
        version -> BigInt,
        vector_clock -> Text,
        checksum -> Text,
        last_modified_by -> Text,
        last_modified_device -> Text,
        created_at -> Text,
        updated_at -> Text,
        deleted_at -> Nullable<Text>,
    }
}

diesel::table! {
    comments (id) {
        id -> Text,
        task_id -> Text,
        author -> Text,
        content -> Text,
        parent_comment_id -> Nullable<Text>,
        is_edited -> Bool,
        version -> BigInt,
        vector_clock -> Text,
        checksum -> Text,
        last_modified_by -> Text,
        last_modified_device -> Text,
        created_at -> Text,
        updated_at -> Text,
        deleted_at -> Nullable<Text>,
    }
}

diesel::table! {
    tombstones (id) {
        id -> Text,
        entity_type -> Text,
        entity_id -> Text,
        org_id -> Text,
        deleted_by -> Text,
        deleted_from_device -> Text,
        vector_clock -> Text,
        created_at -> Text,
        expires_at -> Text,
    }
}

diesel::table! {
    sync_outbox (id) {
        id -> BigInt,
        entity_type -> Text,
        entity_id -> Text,
        operation -> Text,
        payload -> Text,
        priority -> SmallInt,
        created_at -> Text,
        attempt_count -> Integer,
        last_attempt_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
        next_retry_at -> Nullable<Text>,
        status -> Text,
    }
}

diesel::table! {
    /// Singleton (`id = 1`) device-local sync state: last successful
    /// watermark and the device's own vector clock.
    device_state (id) {
        id -> Integer,
        device_id -> Text,
        last_sync_time -> Nullable<Text>,
        vector_clock -> Text,
    }
}

diesel::table! {
    conflicts (id) {
        id -> Text,
        entity_type -> Text,
        entity_id -> Text,
        org_id -> Text,
        local_version -> Text,
        server_version -> Text,
        local_clock -> Text,
        server_clock -> Text,
        conflict_reason -> Text,
        resolution_strategy -> Nullable<Text>,
        resolved_version -> Nullable<Text>,
        resolved_by -> Nullable<Text>,
        resolved_at -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    devices (id) {
        id -> Text,
        org_id -> Text,
        owning_user -> Text,
        fingerprint -> Text,
        friendly_name -> Text,
        last_seen_vector_clock -> Text,
        last_sync_at -> Nullable<Text>,
        is_active -> Bool,
    }
}

diesel::table! {
    sync_log (id) {
        id -> BigInt,
        device_id -> Text,
        user_id -> Text,
        log_type -> Text,
        pushed_count -> Integer,
        pulled_count -> Integer,
        conflicts_detected -> Integer,
        conflicts_resolved -> Integer,
        duration_ms -> BigInt,
        status -> Text,
        error -> Nullable<Text>,
        created_at -> Text,
    }
}
