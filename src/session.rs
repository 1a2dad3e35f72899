//! One watch session: a selected workload, the last-good snapshot, and the
//! current filter/view state. The snapshot sits behind an `Arc` and is
//! swapped whole, so a reader holding the previous one never observes a
//! partially applied update. A generation counter discards async results
//! that resolve after the selection has moved on.

use std::sync::Arc;

use tracing::debug;

use crate::graph::{self, TopologyFilters, TopologyGraph, ViewOptions};
use crate::models::topology::{TopologySnapshot, TopologyUpdate, WorkloadKind};
use crate::reconcile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

pub struct WatchSession {
    selection: Selection,
    context: Option<String>,
    snapshot: Option<Arc<TopologySnapshot>>,
    filters: TopologyFilters,
    view: ViewOptions,
    generation: u64,
}

impl WatchSession {
    pub fn new(
        selection: Selection,
        context: Option<String>,
        filters: TopologyFilters,
        view: ViewOptions,
    ) -> Self {
        Self {
            selection,
            context,
            snapshot: None,
            filters,
            view,
            generation: 0,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Move to a new selection. The old snapshot is dropped and the
    /// generation bumped, so anything still in flight for the previous
    /// selection gets discarded on arrival.
    pub fn select(&mut self, selection: Selection) {
        if selection == self.selection {
            return;
        }
        self.generation += 1;
        self.snapshot = None;
        self.selection = selection;
    }

    /// Install a fetched snapshot. Returns false (and drops the snapshot)
    /// when the fetch belongs to a superseded selection.
    pub fn install_snapshot(&mut self, generation: u64, snapshot: TopologySnapshot) -> bool {
        if generation != self.generation {
            debug!("discarding stale snapshot fetch");
            return false;
        }
        self.snapshot = Some(Arc::new(snapshot));
        true
    }

    /// Reconcile a streamed update into a fresh snapshot. Returns false for
    /// stale-generation updates or when no snapshot has arrived yet.
    pub fn apply_update(&mut self, generation: u64, update: &TopologyUpdate) -> bool {
        if generation != self.generation {
            debug!("discarding update for a superseded selection");
            return false;
        }
        let Some(current) = &self.snapshot else {
            debug!("dropping update that arrived before the first snapshot");
            return false;
        };
        let next = reconcile::apply_update(current, update);
        self.snapshot = Some(Arc::new(next));
        true
    }

    pub fn set_filters(&mut self, filters: TopologyFilters) {
        self.filters = filters;
    }

    pub fn set_view(&mut self, view: ViewOptions) {
        self.view = view;
    }

    pub fn snapshot(&self) -> Option<Arc<TopologySnapshot>> {
        self.snapshot.clone()
    }

    /// Run the full build→layout→filter pipeline over the current snapshot.
    pub fn graph(&self) -> Option<TopologyGraph> {
        self.snapshot.as_ref().map(|snapshot| {
            graph::build_positioned(snapshot, &self.filters, self.context.as_deref(), &self.view)
        })
    }
}
