use std::collections::BTreeMap;

/// Buffer indexado con cursor "siguiente esperado".
///
/// Los elementos llegan en cualquier orden y salen estrictamente en orden de
/// índice, sin huecos. Lo usan tanto el agrupador como el indexador.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Guarda `item`. Devuelve `false` si el índice ya se había entregado o está repetido.
    pub fn insert(&mut self, index: usize, item: T) -> bool {
        if index < self.next || self.pending.contains_key(&index) {
            return false;
        }
        self.pending.insert(index, item);
        true
    }

    /// Saca el siguiente elemento si ya llegó.
    pub fn pop_ready(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next)?;
        self.next += 1;
        Some(item)
    }

    pub fn next_expected(&self) -> usize {
        self.next
    }

    /// Elementos retenidos esperando a un índice anterior.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
