use crate::event::{EventDescriptor, GossipEvent};
use weave_hashes::{EventHash, Hash, HasherBase, HasherExtensions};

/// Returns the content hash of an event. The signature is detached and not part of the hash.
pub fn event_hash(event: &GossipEvent) -> Hash {
    let mut hasher = EventHash::new();
    hasher.write_bool(event.creator.is_some()).write_u64(event.creator.map(|c| c.id()).unwrap_or_default());
    hasher.write_u64(event.time_created).write_u64(event.birth_round);
    write_parent(&mut hasher, event.self_parent.as_ref());
    write_parent(&mut hasher, event.other_parent.as_ref());
    hasher.write_len(event.transactions.len());
    for tx in event.transactions.iter() {
        hasher.write_var_bytes(&tx.payload);
    }
    hasher.finalize()
}

fn write_parent(hasher: &mut EventHash, parent: Option<&EventDescriptor>) {
    match parent {
        Some(parent) => {
            hasher
                .write_bool(true)
                .update(parent.hash)
                .write_u64(parent.creator.id())
                .write_u64(parent.generation)
                .write_u64(parent.birth_round);
        }
        None => {
            hasher.write_bool(false);
        }
    }
}
