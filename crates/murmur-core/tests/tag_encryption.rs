use std::sync::Arc;

use murmur_core::crypto::{generate_random_key, open, seal};
use murmur_core::secrets::{provision_root_key, KeyfileSecretStore, MemorySecretStore};
use murmur_core::storage::{ProtectedField, SqliteStorage};
use murmur_core::{
    FieldName, Journal, JournalConfig, KeyIdentifier, MurmurError, Revealed, SecretStore,
    StorageEngine, WriteOutcome,
};
use tempfile::tempdir;

fn memory_journal() -> Journal {
    let storage = Arc::new(SqliteStorage::open_in_memory().expect("storage should open"));
    let secrets = Arc::new(MemorySecretStore::new());
    Journal::new(storage, secrets, JournalConfig::default())
}

#[test]
fn test_private_tag_scenario() {
    let journal = memory_journal();
    let tag = journal.create_tag("Private").expect("tag should be created");
    journal
        .protect_tag(&tag.id, "1234")
        .expect("PIN should be set");
    journal.lock_all();

    let mut entry = journal.new_entry();
    journal
        .assign_tag(&mut entry, &tag.id)
        .expect("tag should be assigned");
    entry.transcript.set_text("hello");
    let report = journal.save_entry(&mut entry).expect("save should succeed");

    assert_eq!(
        report.outcome(FieldName::Transcript),
        Some(WriteOutcome::DeferredPlaintext)
    );
    let stored = journal.load_entry(&entry.id).expect("entry should load");
    assert_eq!(stored.transcript.plaintext(), Some(b"hello".as_slice()));
    assert!(stored.transcript.is_deferred());

    journal
        .unlock_tag(&tag.id, "1234")
        .expect("unlock should succeed");
    let mut stored = stored;
    journal.save_entry(&mut stored).expect("save should succeed");

    let reloaded = journal.load_entry(&entry.id).expect("entry should load");
    assert!(reloaded.transcript.plaintext().is_none());
    assert!(reloaded.transcript.ciphertext().is_some());
    assert_eq!(
        journal
            .reveal_text(&reloaded, FieldName::Transcript)
            .expect("reveal should succeed"),
        Revealed::Plain("hello".to_string())
    );
}

#[test]
fn test_two_tags_are_key_separated() {
    let journal = memory_journal();
    let a = journal.create_tag("A").expect("tag should be created");
    let b = journal.create_tag("B").expect("tag should be created");
    journal.protect_tag(&a.id, "1111").expect("PIN should be set");
    journal.protect_tag(&b.id, "2222").expect("PIN should be set");

    let mut entry_a = journal.new_entry();
    journal.assign_tag(&mut entry_a, &a.id).expect("assign");
    entry_a.transcript.set_text("alpha");
    journal.save_entry(&mut entry_a).expect("save should succeed");

    let key_a = journal.sessions().get_key(&a.id).expect("A is unlocked");
    let key_b = journal.sessions().get_key(&b.id).expect("B is unlocked");
    let sealed = entry_a
        .transcript
        .ciphertext()
        .expect("field should be sealed");

    assert_eq!(open(sealed, &key_a).expect("A opens A").as_slice(), b"alpha");
    assert!(matches!(open(sealed, &key_b), Err(MurmurError::Decryption(_))));

    let sealed_b = seal(b"bravo", &key_b).expect("seal should succeed");
    assert!(matches!(open(&sealed_b, &key_a), Err(MurmurError::Decryption(_))));

    journal.lock_tag(&a.id);
    assert!(journal
        .reveal_text(&entry_a, FieldName::Transcript)
        .expect("reveal should not fail")
        .is_locked());
    assert!(journal.sessions().is_unlocked(&b.id));
}

#[test]
fn test_destructive_clear_is_a_data_loss_boundary() {
    let journal = memory_journal();
    let tag = journal.create_tag("Private").expect("tag should be created");
    journal.protect_tag(&tag.id, "1234").expect("PIN should be set");

    let mut entry = journal.new_entry();
    journal.assign_tag(&mut entry, &tag.id).expect("assign");
    entry.transcript.set_text("gone");
    journal.save_entry(&mut entry).expect("save should succeed");

    let forgotten = journal
        .clear_tag_encryption_destructive(&tag.id)
        .expect("clear should succeed");
    assert_eq!(forgotten.lost_entries, 1);

    let stored = journal.load_entry(&entry.id).expect("entry should load");
    assert!(stored.transcript.ciphertext().is_some());
    assert!(journal
        .reveal_text(&stored, FieldName::Transcript)
        .expect("reveal should not fail")
        .is_locked());

    // Re-protecting the tag creates a fresh key; the old ciphertext stays unreadable.
    journal.protect_tag(&tag.id, "1234").expect("PIN should be set");
    let stored = journal.load_entry(&entry.id).expect("entry should load");
    let err = journal
        .reveal_text(&stored, FieldName::Transcript)
        .expect_err("old ciphertext must not open under the new key");
    assert!(err.is_data_corruption());
}

#[test]
fn test_remove_encryption_first_keeps_content() {
    let journal = memory_journal();
    let tag = journal.create_tag("Private").expect("tag should be created");
    journal.protect_tag(&tag.id, "1234").expect("PIN should be set");

    let mut entry = journal.new_entry();
    journal.assign_tag(&mut entry, &tag.id).expect("assign");
    entry.analysis.set_text("kept");
    journal.save_entry(&mut entry).expect("save should succeed");
    journal.lock_all();

    journal
        .remove_tag_encryption(&tag.id, "1234")
        .expect("removal should succeed");

    let stored = journal.load_entry(&entry.id).expect("entry should load");
    assert_eq!(stored.analysis.sealed_with(), Some(&KeyIdentifier::root()));
    assert_eq!(
        journal
            .reveal_text(&stored, FieldName::Analysis)
            .expect("reveal should succeed"),
        Revealed::Plain("kept".to_string())
    );
}

#[test]
fn test_sealed_fields_never_reach_disk_in_plaintext() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("journal.db");
    SqliteStorage::create(&db_path).expect("journal should be created");
    let storage = Arc::new(SqliteStorage::open(&db_path).expect("journal should open"));
    let secrets =
        Arc::new(KeyfileSecretStore::open(dir.path().join("keys")).expect("keyfile store"));
    let journal = Journal::new(storage, secrets, JournalConfig::default());

    let mut entry = journal.new_entry();
    entry.transcript.set_text("PLAINTEXT_MARKER_SEALED");
    journal.save_entry(&mut entry).expect("save should succeed");
    drop(journal);

    let on_disk = std::fs::read(&db_path).expect("read should succeed");
    let haystack = String::from_utf8_lossy(&on_disk);
    assert!(!haystack.contains("PLAINTEXT_MARKER_SEALED"));
}

#[test]
fn test_state_survives_restart_but_grants_do_not() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("journal.db");
    let keys = dir.path().join("keys");
    SqliteStorage::create(&db_path).expect("journal should be created");

    let open_journal = || {
        let storage = Arc::new(SqliteStorage::open(&db_path).expect("journal should open"));
        let secrets = Arc::new(KeyfileSecretStore::open(&keys).expect("keyfile store"));
        Journal::new(storage, secrets, JournalConfig::default())
    };

    let entry_id = {
        let journal = open_journal();
        let tag = journal.create_tag("Private").expect("tag should be created");
        journal.protect_tag(&tag.id, "1234").expect("PIN should be set");
        let mut entry = journal.new_entry();
        journal.assign_tag(&mut entry, &tag.id).expect("assign");
        entry.transcript.set_text("across restarts");
        journal.save_entry(&mut entry).expect("save should succeed");
        entry.id
    };

    let journal = open_journal();
    let tag = journal.tag_by_name("private").expect("tag should exist");
    assert!(journal.sessions().unlocked_tags().is_empty());

    let entry = journal.load_entry(&entry_id).expect("entry should load");
    assert!(journal
        .reveal_text(&entry, FieldName::Transcript)
        .expect("reveal should not fail")
        .is_locked());

    journal.unlock_tag(&tag.id, "1234").expect("unlock should succeed");
    assert_eq!(
        journal
            .reveal_text(&entry, FieldName::Transcript)
            .expect("reveal should succeed")
            .plain()
            .as_deref(),
        Some("across restarts")
    );
    journal.check_integrity().expect("journal should be consistent");
}

#[test]
fn test_root_key_is_provisioned_once() {
    let secrets = Arc::new(MemorySecretStore::new());
    let storage = Arc::new(SqliteStorage::open_in_memory().expect("storage should open"));
    let journal = Journal::new(storage, secrets.clone(), JournalConfig::default());

    for text in ["one", "two"] {
        let mut entry = journal.new_entry();
        entry.transcript.set_text(text);
        journal.save_entry(&mut entry).expect("save should succeed");
    }
    journal.lock_all();
    let mut entry = journal.new_entry();
    entry.transcript.set_text("three");
    journal.save_entry(&mut entry).expect("save should succeed");

    assert_eq!(secrets.len(), 1);
    assert!(secrets
        .get(&KeyIdentifier::root())
        .expect("read should succeed")
        .is_some());
    assert_eq!(
        journal
            .storage()
            .list_entries(&Default::default())
            .expect("list should succeed")
            .len(),
        3
    );
}

#[test]
fn test_two_processes_share_one_root_key() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("journal.db");
    let keys = dir.path().join("keys");
    SqliteStorage::create(&db_path).expect("journal should be created");

    let open_journal = || {
        let storage = Arc::new(SqliteStorage::open(&db_path).expect("journal should open"));
        let secrets = Arc::new(KeyfileSecretStore::open(&keys).expect("keyfile store"));
        Journal::new(storage, secrets, JournalConfig::default())
    };
    let first = open_journal();
    let second = open_journal();

    let mut ids = Vec::new();
    for (journal, text) in [(&first, "from first"), (&second, "from second")] {
        let mut entry = journal.new_entry();
        entry.transcript.set_text(text);
        journal.save_entry(&mut entry).expect("save should succeed");
        ids.push((entry.id, text));
    }

    // A late provisioner never replaces the key already in use.
    let late = KeyfileSecretStore::open(&keys).expect("keyfile store");
    let candidate = generate_random_key().expect("key should be generated");
    assert!(!late
        .create(&KeyIdentifier::root(), &candidate)
        .expect("create should succeed"));
    assert_ne!(
        provision_root_key(&late).expect("root key should be read back"),
        candidate
    );

    let reader = open_journal();
    for (id, text) in ids {
        let entry = reader.load_entry(&id).expect("entry should load");
        assert_eq!(
            reader
                .reveal_text(&entry, FieldName::Transcript)
                .expect("reveal should succeed")
                .plain()
                .as_deref(),
            Some(text)
        );
    }
}

#[test]
fn test_corrupt_field_does_not_block_the_rest_of_the_entry() {
    let journal = memory_journal();
    let tag = journal.create_tag("A").expect("tag should be created");
    let mut entry = journal.new_entry();
    entry.transcript.set_text("readable");
    entry.analysis.set_text("will be damaged");
    journal.save_entry(&mut entry).expect("save should succeed");

    let mut damaged = entry
        .analysis
        .ciphertext()
        .expect("field should be sealed")
        .to_vec();
    damaged[0] ^= 0x01;
    entry.analysis =
        ProtectedField::from_parts(None, Some(damaged), Some(KeyIdentifier::root()), false);
    journal.save_entry(&mut entry).expect("save should succeed");

    journal.protect_tag(&tag.id, "1111").expect("PIN should be set");
    let mut entry = journal.load_entry(&entry.id).expect("entry should load");
    journal.assign_tag(&mut entry, &tag.id).expect("assign");
    entry.enhanced_text.set_text("fresh edit");
    let report = journal.save_entry(&mut entry).expect("save should succeed");

    assert_eq!(report.unreadable_fields(), vec![FieldName::Analysis]);
    let stored = journal.load_entry(&entry.id).expect("entry should load");
    assert_eq!(
        journal
            .reveal_text(&stored, FieldName::EnhancedText)
            .expect("reveal should succeed"),
        Revealed::Plain("fresh edit".to_string())
    );
    assert_eq!(
        journal
            .reveal_text(&stored, FieldName::Transcript)
            .expect("reveal should succeed"),
        Revealed::Plain("readable".to_string())
    );
    assert!(journal
        .reveal_text(&stored, FieldName::Analysis)
        .expect_err("damaged field must not open")
        .is_data_corruption());
}
