//! Randomized differential test: a long mixed workload applied both to a
//! `VArray` and to a naive ordered model, with full-state comparison after
//! every operation.

use rand::prelude::*;
use varray::{Key, VArray, Variant};

#[global_allocator]
static ALLOCATOR: mockalloc::Mockalloc<std::alloc::System> =
    mockalloc::Mockalloc(std::alloc::System);

#[derive(Clone, Debug, PartialEq, Eq)]
enum MKey {
    I(i64),
    S(String),
}

/// The simplest possible rendition of the same semantics: an ordered list of
/// pairs plus the auto-key counter.
#[derive(Default)]
struct Model {
    entries: Vec<(MKey, i64)>,
    next_key: i64,
}

impl Model {
    fn find(&self, key: &MKey) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    fn note_int_key(&mut self, key: i64) {
        if key >= self.next_key {
            self.next_key = key + 1;
        }
    }

    fn set(&mut self, key: MKey, value: i64) {
        if let MKey::I(k) = key {
            self.note_int_key(k);
        }
        match self.find(&key) {
            Some(pos) => self.entries[pos].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    fn append(&mut self, value: i64) {
        let key = self.next_key;
        self.next_key += 1;
        self.entries.push((MKey::I(key), value));
    }

    fn remove(&mut self, key: &MKey) {
        if let Some(pos) = self.find(key) {
            self.entries.remove(pos);
        }
    }

    fn pop(&mut self) -> Option<i64> {
        let (key, value) = self.entries.pop()?;
        if let MKey::I(k) = key {
            if self.next_key == k + 1 {
                self.next_key -= 1;
            }
        }
        Some(value)
    }

    fn renumber(&mut self) {
        self.next_key = 0;
        for entry in &mut self.entries {
            if let MKey::I(_) = entry.0 {
                entry.0 = MKey::I(self.next_key);
                self.next_key += 1;
            }
        }
    }

    fn dequeue(&mut self) -> Option<i64> {
        if self.entries.is_empty() {
            return None;
        }
        let (_, value) = self.entries.remove(0);
        self.renumber();
        Some(value)
    }

    fn prepend(&mut self, value: i64) {
        self.entries.insert(0, (MKey::I(0), value));
        self.renumber();
    }
}

fn to_key(key: &MKey) -> Key {
    match key {
        MKey::I(i) => Key::Int(*i),
        MKey::S(s) => Key::from(s.as_str()),
    }
}

fn assert_same(array: &VArray, model: &Model) {
    assert_eq!(array.len(), model.entries.len());
    for (i, (key, value)) in model.entries.iter().enumerate() {
        assert_eq!(*array.key_at(i).unwrap(), to_key(key), "key at {}", i);
        assert_eq!(
            *array.value_at(i).unwrap(),
            Variant::Int(*value),
            "value at {}",
            i
        );
    }
    // Spot-check lookup agreement too, not just iteration order.
    for (key, value) in &model.entries {
        assert_eq!(*array.get(&to_key(key)).unwrap(), Variant::Int(*value));
    }
}

#[mockalloc::test]
fn random_workload_matches_naive_model() {
    let mut rng = StdRng::seed_from_u64(271828);
    let str_keys = ["model-alpha", "model-beta", "model-gamma", "model-delta"];

    let mut array = VArray::new();
    let mut model = Model::default();

    for _ in 0..2000 {
        match rng.gen_range(0..8) {
            0 => {
                let k = rng.gen_range(0..12i64);
                let v = rng.gen_range(0..1000);
                array.set(Key::Int(k), Variant::Int(v));
                model.set(MKey::I(k), v);
            }
            1 => {
                let s = str_keys[rng.gen_range(0..str_keys.len())];
                let v = rng.gen_range(0..1000);
                array.set(Key::from(s), Variant::Int(v));
                model.set(MKey::S(s.to_owned()), v);
            }
            2 => {
                let v = rng.gen_range(0..1000);
                array.append(Variant::Int(v));
                model.append(v);
            }
            3 => {
                let k = rng.gen_range(0..12i64);
                array.remove(&Key::Int(k));
                model.remove(&MKey::I(k));
            }
            4 => {
                let s = str_keys[rng.gen_range(0..str_keys.len())];
                array.remove(&Key::from(s));
                model.remove(&MKey::S(s.to_owned()));
            }
            5 => {
                let got = array.pop();
                match model.pop() {
                    Some(v) => assert_eq!(got, Variant::Int(v)),
                    None => assert_eq!(got, Variant::Null),
                }
            }
            6 => {
                let got = array.dequeue();
                match model.dequeue() {
                    Some(v) => assert_eq!(got, Variant::Int(v)),
                    None => assert_eq!(got, Variant::Null),
                }
            }
            _ => {
                let v = rng.gen_range(0..1000);
                array.prepend(Variant::Int(v));
                model.prepend(v);
            }
        }
        assert_same(&array, &model);
    }
}

#[mockalloc::test]
fn random_workload_with_shared_handles() {
    let mut rng = StdRng::seed_from_u64(314159);

    let mut array = VArray::new();
    let mut model = Model::default();
    let mut snapshots: Vec<(VArray, Vec<(MKey, i64)>)> = Vec::new();

    for step in 0..500 {
        match rng.gen_range(0..4) {
            0 => {
                let v = rng.gen_range(0..1000);
                array.append(Variant::Int(v));
                model.append(v);
            }
            1 => {
                let k = rng.gen_range(0..8i64);
                let v = rng.gen_range(0..1000);
                array.set(Key::Int(k), Variant::Int(v));
                model.set(MKey::I(k), v);
            }
            2 => {
                let k = rng.gen_range(0..8i64);
                array.remove(&Key::Int(k));
                model.remove(&MKey::I(k));
            }
            _ => {
                let got = array.pop();
                match model.pop() {
                    Some(v) => assert_eq!(got, Variant::Int(v)),
                    None => assert_eq!(got, Variant::Null),
                }
            }
        }
        if step % 50 == 0 {
            snapshots.push((array.clone(), model.entries.clone()));
        }
        assert_same(&array, &model);
    }

    // Every snapshot kept the state it was taken with, untouched by all the
    // mutation that followed.
    for (snap, entries) in &snapshots {
        assert_eq!(snap.len(), entries.len());
        for (i, (key, value)) in entries.iter().enumerate() {
            assert_eq!(*snap.key_at(i).unwrap(), to_key(key));
            assert_eq!(*snap.value_at(i).unwrap(), Variant::Int(*value));
        }
    }
}
