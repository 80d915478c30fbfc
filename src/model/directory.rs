//! The ranked collection of directory listings ("exhibit"): one entry per
//! directory currently reported interesting by the glob channel, each
//! owning its own [`FileBox`].

use super::file::{FileBox, Ordering as FileOrdering};

fn parse_decimal(bytes: &[u8]) -> i64 {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

pub struct DListing {
    pub name: Vec<u8>,
    pub rank: i32,
    pub old_rank: i32,
    pub marked: bool,
    pub selected_count: Vec<u8>,
    pub total_count: Vec<u8>,
    pub hidden_count: Vec<u8>,
    pub file_box: FileBox,
}

impl DListing {
    pub fn is_new(&self) -> bool {
        self.old_rank < 0
    }

    /// The textual summary shown next to a directory heading.
    pub fn count_label(&self, show_hidden: bool, file_display_limit: usize) -> String {
        if self.total_count == b"0" {
            return "(Restricted)".to_string();
        }
        let total = parse_decimal(&self.total_count);
        let hidden = parse_decimal(&self.hidden_count);
        let n_displayed = total - if !show_hidden { hidden } else { 0 };

        let selected = String::from_utf8_lossy(&self.selected_count);
        let total_s = String::from_utf8_lossy(&self.total_count);
        let hidden_s = String::from_utf8_lossy(&self.hidden_count);

        if file_display_limit != 0 && n_displayed > file_display_limit as i64 {
            format!("{selected} {total_s} {hidden_s} [Results truncated]")
        } else {
            format!("{selected} {total_s} {hidden_s}")
        }
    }
}

/// Ordered (by rank) collection of [`DListing`]s, driven entirely by the
/// mark/cull/rearrange cycle the protocol decoder runs once per frame.
pub struct DirectoryModel {
    listings: Vec<DListing>,
    ordering: FileOrdering,
    show_hidden: bool,
    file_display_limit: usize,
}

impl DirectoryModel {
    pub fn new(ordering: FileOrdering) -> Self {
        DirectoryModel {
            listings: Vec::new(),
            ordering,
            show_hidden: false,
            file_display_limit: 300,
        }
    }

    pub fn listings(&self) -> &[DListing] {
        &self.listings
    }

    pub fn set_show_hidden(&mut self, show_hidden: bool) {
        self.show_hidden = show_hidden;
        for l in &mut self.listings {
            l.file_box.set_show_hidden(show_hidden);
        }
    }

    pub fn set_file_display_limit(&mut self, limit: usize) {
        self.file_display_limit = limit;
        for l in &mut self.listings {
            l.file_box.set_file_display_limit(limit);
        }
    }

    /// Frame entry: unmark every listing and every file within it.
    pub fn unmark_all(&mut self) {
        for l in &mut self.listings {
            l.marked = false;
            l.file_box.unmark_all();
        }
    }

    /// Create or update the named listing and mark it current for this
    /// frame. A pre-existing listing has its files unmarked too, since the
    /// decoder is about to re-read its file set.
    pub fn add(
        &mut self,
        name: &[u8],
        rank: i32,
        selected: &[u8],
        total: &[u8],
        hidden: &[u8],
    ) -> &mut DListing {
        if let Some(idx) = self.listings.iter().position(|l| l.name == name) {
            let l = &mut self.listings[idx];
            l.old_rank = l.rank;
            l.rank = rank;
            l.selected_count = selected.to_vec();
            l.total_count = total.to_vec();
            l.hidden_count = hidden.to_vec();
            l.marked = true;
            l.file_box.unmark_all();
            &mut self.listings[idx]
        } else {
            let mut fb = FileBox::new(self.ordering);
            fb.set_show_hidden(self.show_hidden);
            fb.set_file_display_limit(self.file_display_limit);
            self.listings.push(DListing {
                name: name.to_vec(),
                rank,
                old_rank: -1,
                marked: true,
                selected_count: selected.to_vec(),
                total_count: total.to_vec(),
                hidden_count: hidden.to_vec(),
                file_box: fb,
            });
            self.listings.last_mut().unwrap()
        }
    }

    pub fn listing_mut_by_name(&mut self, name: &[u8]) -> Option<&mut DListing> {
        self.listings.iter_mut().find(|l| l.name == name)
    }

    /// Frame end: cull unmarked file entries and listings, then reorder the
    /// visible sequence to match rank order.
    pub fn end_frame(&mut self) {
        for l in &mut self.listings {
            l.file_box.cull();
        }
        self.listings.retain(|l| l.marked);
        self.listings.sort_by_key(|l| l.rank);
    }

    pub fn cull(&mut self) {
        self.listings.retain(|l| l.marked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::file::Selection;

    #[test]
    fn rank_permutation_after_rearrange() {
        let mut m = DirectoryModel::new(FileOrdering::Ls);
        m.unmark_all();
        m.add(b"/a", 2, b"0", b"0", b"0");
        m.add(b"/b", 1, b"0", b"0", b"0");
        m.end_frame();
        let ranks: Vec<i32> = m.listings().iter().map(|l| l.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[test]
    fn mark_cull_idempotence_on_idle_model() {
        let mut m = DirectoryModel::new(FileOrdering::Ls);
        m.add(b"/tmp", 1, b"0", b"0", b"0");
        m.unmark_all();
        m.cull();
        assert!(m.listings().is_empty());
    }

    #[test]
    fn protocol_frame_scenario() {
        // Scenario 4: "1 2 1 /tmp\n\t* d foo\n\t- r bar\n\n"
        let mut m = DirectoryModel::new(FileOrdering::Ls);
        m.unmark_all();
        let l = m.add(b"/tmp", 1, b"1", b"2", b"1");
        l.file_box.unmark_all();
        l.file_box
            .add(b"foo", crate::model::file::FileType::Directory, Selection::Yes);
        l.file_box
            .add(b"bar", crate::model::file::FileType::Regular, Selection::No);
        m.end_frame();

        assert_eq!(m.listings().len(), 1);
        let l = &m.listings()[0];
        assert_eq!(l.name, b"/tmp");
        assert_eq!(l.rank, 1);
        assert_eq!(l.selected_count, b"1");
        assert_eq!(l.total_count, b"2");
        assert_eq!(l.hidden_count, b"1");
        let names: Vec<_> = l.file_box.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec![b"bar".to_vec(), b"foo".to_vec()]);
    }

    #[test]
    fn restricted_label_on_zero_total() {
        let mut m = DirectoryModel::new(FileOrdering::Ls);
        let l = m.add(b"/secret", 1, b"0", b"0", b"0");
        assert_eq!(l.count_label(false, 300), "(Restricted)");
    }
}
