#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lucy_registry::{Handle, Registry};

#[derive(Arbitrary, Debug)]
enum Op {
    Store(u16),
    Delete(u8),
    Fetch(u8),
}

#[derive(Arbitrary, Debug)]
struct Input {
    capacity: u8,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let reg = Registry::new(input.capacity as usize);
    let mut model: HashMap<usize, u16> = HashMap::new();

    for op in input.ops {
        match op {
            Op::Store(value) => {
                let h = reg.store(value);
                assert!(model.insert(h.into_raw(), value).is_none());
            }
            Op::Delete(raw) => {
                let Some(h) = Handle::from_raw(raw as usize) else {
                    continue;
                };
                assert_eq!(reg.delete(h), model.remove(&(raw as usize)).is_some());
            }
            Op::Fetch(raw) => {
                let Some(h) = Handle::from_raw(raw as usize) else {
                    continue;
                };
                assert_eq!(reg.fetch(h), model.get(&(raw as usize)).copied());
            }
        }
    }
    assert_eq!(reg.live(), model.len());
});
