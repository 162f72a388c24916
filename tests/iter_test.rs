//! Strong-iterator and cursor behavior across structural edits

use varray::{IterState, Key, VArray, Variant};

#[global_allocator]
static ALLOCATOR: mockalloc::Mockalloc<std::alloc::System> =
    mockalloc::Mockalloc(std::alloc::System);

fn sample() -> VArray {
    let mut a = VArray::new();
    a.append(Variant::from("a"));
    a.append(Variant::from("b"));
    a.set(Key::from("mid"), Variant::from("c"));
    a.append(Variant::from("d"));
    a
}

#[mockalloc::test]
fn advance_walks_in_insertion_order() {
    let a = sample();
    let it = a.register_iter();
    assert_eq!(it.state(), IterState::Reset);

    let mut seen = Vec::new();
    while a.advance_iter(&it) {
        let pos = it.pos().unwrap();
        seen.push(a.key_at(pos).unwrap().clone());
    }
    assert_eq!(
        seen,
        vec![Key::Int(0), Key::Int(1), Key::from("mid"), Key::Int(2)]
    );
    // Off the end: invalid, and advancing again stays invalid.
    assert_eq!(it.state(), IterState::Invalid);
    assert!(!a.advance_iter(&it));
}

#[mockalloc::test]
fn cursor_tracks_iterator_successor() {
    let a = sample();
    let it = a.register_iter();

    assert!(a.advance_iter(&it));
    assert_eq!(it.pos(), Some(0));
    assert_eq!(a.cursor(), Some(1));

    assert!(a.advance_iter(&it));
    assert!(a.advance_iter(&it));
    assert!(a.advance_iter(&it));
    assert_eq!(it.pos(), Some(3));
    // The iterator is on the last element; the cursor has run off the end.
    assert_eq!(a.cursor(), None);
}

#[mockalloc::test]
fn removal_behind_the_iterator_is_repaired() {
    let mut a = sample();
    let it = a.register_iter();
    assert!(a.advance_iter(&it));
    assert!(a.advance_iter(&it));
    assert_eq!(it.pos(), Some(1));

    // Removing an earlier element shifts everything down one slot; the
    // iterator still points at the same logical element.
    a.remove(&Key::Int(0));
    assert_eq!(it.pos(), Some(0));
    assert_eq!(*a.value_at(0).unwrap(), Variant::from("b"));

    // The rest of the walk continues from there.
    assert!(a.advance_iter(&it));
    assert_eq!(*a.key_at(it.pos().unwrap()).unwrap(), Key::from("mid"));
}

#[mockalloc::test]
fn removing_the_first_element_resets_an_iterator_on_it() {
    let mut a = sample();
    let it = a.register_iter();
    assert!(a.advance_iter(&it));
    assert_eq!(it.pos(), Some(0));

    a.remove(&Key::Int(0));
    assert_eq!(it.state(), IterState::Reset);
    // The next advance lands on the new first element.
    assert!(a.advance_iter(&it));
    assert_eq!(*a.value_at(it.pos().unwrap()).unwrap(), Variant::from("b"));
}

#[mockalloc::test]
fn prepend_and_dequeue_invalidate_iterators() {
    let mut a = sample();
    let it = a.register_iter();
    assert!(a.advance_iter(&it));

    a.prepend(Variant::from("z"));
    assert_eq!(it.state(), IterState::Invalid);
    assert!(!a.advance_iter(&it));

    // A reset re-attaches the handle.
    a.reset_iter(&it);
    assert!(a.advance_iter(&it));
    assert_eq!(*a.value_at(it.pos().unwrap()).unwrap(), Variant::from("z"));

    a.dequeue();
    assert_eq!(it.state(), IterState::Invalid);
}

#[mockalloc::test]
fn dequeue_on_empty_still_detaches_iterators() {
    let mut a = VArray::new();
    let it = a.register_iter();
    assert_eq!(a.dequeue(), Variant::Null);
    assert_eq!(it.state(), IterState::Invalid);
}

#[mockalloc::test]
fn empty_dequeue_through_a_shared_handle_spares_other_holders() {
    let a = VArray::new();
    let it = a.register_iter();
    let mut b = a.clone();

    // The dequeue lands on b's private duplicate; a's iterator is untouched.
    assert_eq!(b.dequeue(), Variant::Null);
    assert_eq!(it.state(), IterState::Reset);
    assert!(!a.ptr_eq(&b));
}

#[mockalloc::test]
fn clone_with_iters_moves_the_walk_to_the_copy() {
    let a = sample();
    let it = a.register_iter();
    assert!(a.advance_iter(&it));
    assert!(a.advance_iter(&it));
    assert_eq!(it.pos(), Some(1));

    let mut b = a.clone_with_iters();
    assert!(!a.ptr_eq(&b));

    // The iterator now belongs to the copy: removals through the copy
    // repair it, removals through the original no longer reach it.
    let mut a = a;
    a.remove(&Key::Int(0));
    assert_eq!(it.pos(), Some(1));

    b.remove(&Key::Int(0));
    assert_eq!(it.pos(), Some(0));

    // And the walk continues on the copy from where it stood.
    assert!(b.advance_iter(&it));
    assert_eq!(*b.key_at(it.pos().unwrap()).unwrap(), Key::from("mid"));
}

#[mockalloc::test]
fn dequeue_with_cursor_on_the_last_element() {
    let mut a = VArray::new();
    a.append(Variant::from("a"));
    a.append(Variant::from("b"));
    a.reset_cursor();
    a.cursor_advance();
    assert_eq!(a.cursor(), Some(1));

    // The shrink puts the stale cursor one past the live range until the
    // renumber; afterwards it must sit on the new front.
    assert_eq!(a.dequeue(), Variant::from("a"));
    assert_eq!(a.cursor(), Some(0));
    let (k, v) = a.current().unwrap();
    assert_eq!(*k, Key::Int(0));
    assert_eq!(*v, Variant::from("b"));
}

#[mockalloc::test]
fn iterators_survive_mutation_of_another_handle() {
    let a = sample();
    let it = a.register_iter();
    assert!(a.advance_iter(&it));
    assert!(a.advance_iter(&it));

    // A copy-on-write duplicate made through another handle must not
    // disturb iterators attached to this one.
    let mut b = a.clone();
    b.prepend(Variant::from("z"));
    b.remove(&Key::Int(1));

    assert_eq!(it.pos(), Some(1));
    assert!(a.advance_iter(&it));
    assert_eq!(*a.key_at(it.pos().unwrap()).unwrap(), Key::from("mid"));
    assert_eq!(a.len(), 4);
}

#[mockalloc::test]
fn dropped_iterators_do_not_block_repair() {
    let mut a = sample();
    let it = a.register_iter();
    let dropped = a.register_iter();
    assert!(a.advance_iter(&it));
    assert!(a.advance_iter(&dropped));
    drop(dropped);

    // The registry prunes the dead handle and repairs the live one.
    a.remove(&Key::Int(0));
    assert_eq!(it.state(), IterState::Reset);
}
