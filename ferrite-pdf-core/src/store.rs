//! Indirect-object store.
//!
//! Owns every parsed or created object, keyed by `(object number,
//! generation)`. Implements the PDF free-list protocol: removing an object
//! frees its number at generation + 1, numbers whose generation reached
//! 65535 are retired for good, and allocation pops the lowest free number
//! before advancing past the highest number ever seen.

use crate::error::{ErrorKind, PdfError, Result};
use crate::parser::objects::{
    Object, ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, StreamBody,
    MAX_GENERATION,
};
use std::collections::{BTreeMap, HashSet};
use std::rc::{Rc, Weak};

/// Default allocation cap: object numbers stay below 2^31.
pub const DEFAULT_OBJECT_CAP: u32 = i32::MAX as u32;

/// Receives stream-append notifications. Observers are held weakly; a
/// dropped observer is pruned on the next notification.
pub trait StoreObserver {
    fn begin_append_stream(&self, id: ObjectId);
    fn end_append_stream(&self, id: ObjectId);
}

/// Sparse keyed container for every indirect object of a document.
pub struct ObjectStore {
    objects: BTreeMap<ObjectId, Object>,
    /// Free ids sorted ascending by object number, set-unique per number.
    free_list: Vec<ObjectId>,
    /// Numbers whose generation reached 65535; never allocated again.
    unavailable: HashSet<u32>,
    /// Object-stream containers; exempt from garbage collection.
    compressed_streams: HashSet<u32>,
    max_object: u32,
    object_cap: u32,
    observers: Vec<Weak<dyn StoreObserver>>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("objects", &self.objects.len())
            .field("free_list", &self.free_list)
            .field("max_object", &self.max_object)
            .finish()
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::with_object_cap(DEFAULT_OBJECT_CAP)
    }

    pub fn with_object_cap(object_cap: u32) -> Self {
        ObjectStore {
            objects: BTreeMap::new(),
            free_list: Vec::new(),
            unavailable: HashSet::new(),
            compressed_streams: HashSet::new(),
            max_object: 0,
            object_cap,
            observers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Highest object number ever inserted.
    pub fn max_object(&self) -> u32 {
        self.max_object
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    /// Mutable access marks the object dirty.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        let object = self.objects.get_mut(&id)?;
        object.dirty = true;
        Some(object)
    }

    /// Mutable access for internal bookkeeping (body materialization) that
    /// is not a semantic mutation.
    pub(crate) fn get_mut_untracked(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    pub fn must_get(&self, id: ObjectId) -> Result<&Object> {
        self.objects.get(&id).ok_or_else(|| {
            PdfError::with_message(ErrorKind::ObjectNotFound, format!("{id} is not in the store"))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &Object)> {
        self.objects.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Sorted free list, for inspection.
    pub fn free_list(&self) -> &[ObjectId] {
        &self.free_list
    }

    pub fn is_unavailable(&self, number: u32) -> bool {
        self.unavailable.contains(&number)
    }

    /// Whether an object number currently sits on the free list.
    pub fn is_free(&self, number: u32) -> bool {
        self.free_list
            .binary_search_by_key(&number, |entry| entry.number())
            .is_ok()
    }

    /// Allocate a fresh reference: lowest free number first, otherwise the
    /// next number past `max_object`, skipping retired numbers.
    pub fn allocate(&mut self) -> Result<ObjectId> {
        if !self.free_list.is_empty() {
            let id = self.free_list.remove(0);
            self.max_object = self.max_object.max(id.number());
            return Ok(id);
        }
        let mut candidate = self.max_object;
        loop {
            candidate = candidate.checked_add(1).ok_or_else(|| {
                PdfError::with_message(ErrorKind::ValueOutOfRange, "object numbers exhausted")
            })?;
            if candidate > self.object_cap {
                return Err(PdfError::with_message(
                    ErrorKind::ValueOutOfRange,
                    format!("object number {candidate} exceeds the cap {}", self.object_cap),
                ));
            }
            if !self.unavailable.contains(&candidate) {
                self.max_object = candidate;
                return Ok(ObjectId::new(candidate, 0));
            }
        }
    }

    /// Create a dictionary object, optionally pre-filling `/Type` and
    /// `/Subtype`.
    pub fn insert_new_dict(
        &mut self,
        type_name: Option<&str>,
        subtype: Option<&str>,
    ) -> Result<&mut Object> {
        let mut dict = PdfDictionary::new();
        if let Some(type_name) = type_name {
            dict.insert("Type", PdfObject::Name(PdfName::new(type_name)));
        }
        if let Some(subtype) = subtype {
            dict.insert("Subtype", PdfObject::Name(PdfName::new(subtype)));
        }
        self.insert_value(PdfObject::Dictionary(dict))
    }

    /// Create an empty array object.
    pub fn insert_new_array(&mut self) -> Result<&mut Object> {
        self.insert_value(PdfObject::Array(PdfArray::new()))
    }

    /// Insert a caller-supplied value under a fresh reference.
    pub fn insert_value(&mut self, value: PdfObject) -> Result<&mut Object> {
        let id = self.allocate()?;
        let object = Object {
            id,
            value,
            stream: None,
            dirty: true,
        };
        Ok(self.objects.entry(id).or_insert(object))
    }

    /// Insert with a caller-chosen reference, replacing any object already
    /// stored under it.
    pub fn push(&mut self, object: Object) {
        let id = object.id;
        self.max_object = self.max_object.max(id.number());
        // The number is in use now; it cannot also be on the free list.
        if let Ok(pos) = self
            .free_list
            .binary_search_by_key(&id.number(), |entry| entry.number())
        {
            self.free_list.remove(pos);
        }
        self.objects.insert(id, object);
    }

    /// Remove an object. With `mark_free` its number goes back to the free
    /// list at generation + 1; a number that reaches generation 65535 is
    /// retired instead. Object-stream containers cannot be removed.
    pub fn remove(&mut self, id: ObjectId, mark_free: bool) -> Result<Option<Object>> {
        if self.compressed_streams.contains(&id.number()) {
            return Err(PdfError::with_message(
                ErrorKind::InternalLogic,
                format!("{id} is an object-stream container"),
            ));
        }
        let removed = self.objects.remove(&id);
        if removed.is_some() && mark_free {
            let next_generation = id.generation().saturating_add(1);
            if next_generation >= MAX_GENERATION {
                self.unavailable.insert(id.number());
            } else {
                self.add_free(ObjectId::new(id.number(), next_generation));
            }
        }
        Ok(removed)
    }

    /// Sorted, idempotent free-list insert. A duplicate number is ignored
    /// with a warning.
    pub fn add_free(&mut self, id: ObjectId) {
        if id.number() == 0 || self.unavailable.contains(&id.number()) {
            return;
        }
        match self
            .free_list
            .binary_search_by_key(&id.number(), |entry| entry.number())
        {
            Ok(_) => {
                tracing::warn!(number = id.number(), "duplicate free-list entry ignored");
            }
            Err(pos) => self.free_list.insert(pos, id),
        }
        self.max_object = self.max_object.max(id.number());
    }

    /// Record that this object number exists in the document, so fresh
    /// allocations start past it.
    pub fn bump_max_object(&mut self, number: u32) {
        self.max_object = self.max_object.max(number);
    }

    /// Retire a number whose generation reached 65535; it is never
    /// allocated again.
    pub fn retire(&mut self, number: u32) {
        self.unavailable.insert(number);
    }

    /// Mark an object number as an object-stream container. Containers
    /// survive garbage collection even when unreferenced.
    pub fn add_compressed_stream(&mut self, number: u32) {
        self.compressed_streams.insert(number);
    }

    pub fn is_compressed_stream(&self, number: u32) -> bool {
        self.compressed_streams.contains(&number)
    }

    /// Drop everything. Used when a parse fails beyond recovery.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.free_list.clear();
        self.unavailable.clear();
        self.compressed_streams.clear();
        self.max_object = 0;
    }

    pub fn attach(&mut self, observer: &Rc<dyn StoreObserver>) {
        self.observers.push(Rc::downgrade(observer));
    }

    pub fn detach(&mut self, observer: &Rc<dyn StoreObserver>) {
        self.observers.retain(|weak| {
            weak.upgrade()
                .is_some_and(|existing| !Rc::ptr_eq(&existing, observer))
        });
    }

    fn notify(&mut self, call: impl Fn(&dyn StoreObserver)) {
        self.observers.retain(|weak| weak.upgrade().is_some());
        for weak in &self.observers {
            if let Some(observer) = weak.upgrade() {
                call(&*observer);
            }
        }
    }

    /// Append bytes to an object's stream body, creating an empty owned
    /// body when none exists. Observers are notified around the mutation.
    pub fn append_stream_data(&mut self, id: ObjectId, bytes: &[u8]) -> Result<()> {
        if !self.objects.contains_key(&id) {
            return Err(PdfError::with_message(
                ErrorKind::ObjectNotFound,
                format!("{id} is not in the store"),
            ));
        }
        self.notify(|observer| observer.begin_append_stream(id));
        let result = self.append_stream_data_inner(id, bytes);
        self.notify(|observer| observer.end_append_stream(id));
        result
    }

    fn append_stream_data_inner(&mut self, id: ObjectId, bytes: &[u8]) -> Result<()> {
        let object = self.objects.get_mut(&id).ok_or_else(|| {
            PdfError::with_message(ErrorKind::ObjectNotFound, format!("{id} vanished"))
        })?;
        match &mut object.stream {
            None => {
                object.stream = Some(PdfStream {
                    body: StreamBody::Owned(bytes.to_vec()),
                    deferred_length: false,
                });
            }
            Some(stream) => match &mut stream.body {
                StreamBody::Owned(data) => data.extend_from_slice(bytes),
                StreamBody::Range { .. } => {
                    return Err(PdfError::with_message(
                        ErrorKind::InternalLogic,
                        format!("{id}: stream body is not loaded"),
                    ));
                }
            },
        }
        let new_len = object.stream.as_ref().map(|s| s.raw_len()).unwrap_or(0);
        if let Some(dict) = object.value.as_dict_mut() {
            dict.insert("Length", PdfObject::Integer(new_len as i64));
        }
        object.dirty = true;
        Ok(())
    }

    /// Free every object that is not reachable from the trailer. Compressed
    /// object-stream containers always survive: other live objects are
    /// materialized out of them. Returns the number of collected objects.
    pub fn collect_garbage(&mut self, trailer: &PdfDictionary, recursion_limit: u16) -> Result<usize> {
        let mut reachable: HashSet<ObjectId> = HashSet::new();
        let mut queue: Vec<ObjectId> = Vec::new();
        for (_, value) in trailer.iter() {
            collect_references(value, 0, recursion_limit, &mut queue)?;
        }
        while let Some(id) = queue.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(object) = self.objects.get(&id) {
                collect_references(&object.value, 0, recursion_limit, &mut queue)?;
            }
        }

        let victims: Vec<ObjectId> = self
            .objects
            .keys()
            .filter(|id| {
                !reachable.contains(id) && !self.compressed_streams.contains(&id.number())
            })
            .copied()
            .collect();
        let collected = victims.len();
        for id in victims {
            self.remove(id, true)?;
        }
        Ok(collected)
    }
}

/// Gather every `Reference` inside a value, depth-capped.
fn collect_references(
    value: &PdfObject,
    depth: u16,
    limit: u16,
    out: &mut Vec<ObjectId>,
) -> Result<()> {
    if depth >= limit {
        return Err(PdfError::with_message(
            ErrorKind::RecursionLimit,
            "value nesting during garbage collection",
        ));
    }
    match value {
        PdfObject::Reference(id) => out.push(*id),
        PdfObject::Array(array) => {
            for element in array.iter() {
                collect_references(element, depth + 1, limit, out)?;
            }
        }
        PdfObject::Dictionary(dict) => {
            for (_, element) in dict.iter() {
                collect_references(element, depth + 1, limit, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}
