//! Per-directory file collection: ordering, hidden-file filtering, and the
//! display-limit admission rules.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Yes,
    No,
    Maybe,
}

impl Selection {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'*' => Some(Selection::Yes),
            b'-' => Some(Selection::No),
            b'~' => Some(Selection::Maybe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Executable,
    Directory,
    BlockDev,
    CharDev,
    Fifo,
    Socket,
    Symlink,
}

impl FileType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'r' => Some(FileType::Regular),
            b'e' => Some(FileType::Executable),
            b'd' => Some(FileType::Directory),
            b'b' => Some(FileType::BlockDev),
            b'c' => Some(FileType::CharDev),
            b'f' => Some(FileType::Fifo),
            b's' => Some(FileType::Socket),
            b'y' => Some(FileType::Symlink),
            _ => None,
        }
    }

    fn is_dir_like(self) -> bool {
        matches!(self, FileType::Directory)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayCategory {
    Reveal,
    Mask,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    Ls,
    Win,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Hidden,
    Shown,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: Vec<u8>,
    pub file_type: FileType,
    pub selection: Selection,
    pub category: DisplayCategory,
    pub marked: bool,
    admission: Admission,
    counts: bool,
}

impl FileEntry {
    fn is_hidden(name: &[u8]) -> bool {
        name.first() == Some(&b'.')
    }

    pub fn is_visible(&self) -> bool {
        self.admission == Admission::Shown
    }
}

pub struct FileBox {
    entries: Vec<FileEntry>,
    show_hidden: bool,
    file_display_limit: usize,
    n_displayed: usize,
    ordering: Ordering,
}

const DEFAULT_FILE_DISPLAY_LIMIT: usize = 300;

impl FileBox {
    pub fn new(ordering: Ordering) -> Self {
        FileBox {
            entries: Vec::new(),
            show_hidden: false,
            file_display_limit: DEFAULT_FILE_DISPLAY_LIMIT,
            n_displayed: 0,
            ordering,
        }
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn n_displayed(&self) -> usize {
        self.n_displayed
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    pub fn file_display_limit(&self) -> usize {
        self.file_display_limit
    }

    pub fn set_show_hidden(&mut self, show_hidden: bool) {
        if show_hidden == self.show_hidden {
            return;
        }
        self.show_hidden = show_hidden;
        self.recompute_admission();
    }

    pub fn set_file_display_limit(&mut self, limit: usize) {
        if limit == self.file_display_limit {
            return;
        }
        self.file_display_limit = limit;
        self.recompute_admission();
    }

    fn cmp_order(&self, a: &[u8], a_ty: FileType, b: &[u8], b_ty: FileType) -> std::cmp::Ordering {
        match self.ordering {
            Ordering::Ls => a.cmp(b),
            Ordering::Win => match (a_ty.is_dir_like(), b_ty.is_dir_like()) {
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                _ => a.cmp(b),
            },
        }
    }

    fn find(&self, name: &[u8]) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Insert or update an entry, mark it, and recompute admission.
    pub fn add(&mut self, name: &[u8], file_type: FileType, selection: Selection) {
        if let Some(idx) = self.find(name) {
            let type_changed = self.entries[idx].file_type != file_type;
            self.entries[idx].file_type = file_type;
            self.entries[idx].selection = selection;
            self.entries[idx].marked = true;
            if type_changed && self.ordering == Ordering::Win {
                let entry = self.entries.remove(idx);
                let pos = self
                    .entries
                    .binary_search_by(|e| self.cmp_order(&e.name, e.file_type, &entry.name, entry.file_type))
                    .unwrap_or_else(|p| p);
                self.entries.insert(pos, entry);
            }
        } else {
            let pos = self
                .entries
                .binary_search_by(|e| self.cmp_order(&e.name, e.file_type, name, file_type))
                .unwrap_or_else(|p| p);
            self.entries.insert(
                pos,
                FileEntry {
                    name: name.to_vec(),
                    file_type,
                    selection,
                    category: DisplayCategory::Indeterminate,
                    marked: true,
                    admission: Admission::Hidden,
                    counts: false,
                },
            );
        }
        self.recompute_admission();
    }

    pub fn unmark_all(&mut self) {
        for e in &mut self.entries {
            e.marked = false;
        }
    }

    /// Remove entries not remarked since the last `unmark_all`, then
    /// recompute admission over the surviving, still-ordered set.
    pub fn cull(&mut self) {
        self.entries.retain(|e| e.marked);
        self.recompute_admission();
    }

    fn recompute_admission(&mut self) {
        let mut displayed = 0usize;
        for e in &mut self.entries {
            e.category = if FileEntry::is_hidden(&e.name) && !self.show_hidden {
                DisplayCategory::Mask
            } else {
                DisplayCategory::Reveal
            };
            let under_limit =
                self.file_display_limit == 0 || displayed < self.file_display_limit;
            let (counts, shown) = match e.category {
                DisplayCategory::Reveal if under_limit => {
                    displayed += 1;
                    (true, true)
                }
                DisplayCategory::Reveal => (false, e.selection == Selection::Yes),
                DisplayCategory::Mask => (false, e.selection == Selection::Yes),
                DisplayCategory::Indeterminate => (false, false),
            };
            e.counts = counts || e.selection == Selection::Yes;
            e.admission = if shown {
                Admission::Shown
            } else {
                Admission::Hidden
            };
        }
        // n_displayed per the invariant: reveal-and-under-limit, or
        // selection == yes, each count once.
        self.n_displayed = self.entries.iter().filter(|e| e.counts).count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ls_ordering_is_lexicographic() {
        let mut fb = FileBox::new(Ordering::Ls);
        fb.add(b"foo", FileType::Directory, Selection::Yes);
        fb.add(b"bar", FileType::Regular, Selection::No);
        let names: Vec<_> = fb.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec![b"bar".to_vec(), b"foo".to_vec()]);
    }

    #[test]
    fn win_ordering_puts_directories_first() {
        let mut fb = FileBox::new(Ordering::Win);
        fb.add(b"bar", FileType::Regular, Selection::No);
        fb.add(b"foo", FileType::Directory, Selection::Yes);
        let names: Vec<_> = fb.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec![b"foo".to_vec(), b"bar".to_vec()]);
    }

    #[test]
    fn hidden_toggle_symmetry() {
        let mut fb = FileBox::new(Ordering::Ls);
        fb.add(b".secret", FileType::Regular, Selection::No);
        fb.add(b"visible", FileType::Regular, Selection::No);
        let before: Vec<bool> = fb.entries().iter().map(|e| e.is_visible()).collect();
        fb.set_show_hidden(true);
        fb.set_show_hidden(false);
        let after: Vec<bool> = fb.entries().iter().map(|e| e.is_visible()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn display_limit_monotonicity() {
        let mut fb = FileBox::new(Ordering::Ls);
        for i in 0..10u8 {
            fb.add(&[b'a' + i], FileType::Regular, Selection::No);
        }
        fb.set_file_display_limit(3);
        assert_eq!(fb.n_displayed(), 3);
        fb.set_file_display_limit(5);
        assert_eq!(fb.n_displayed(), 5);
        fb.set_file_display_limit(1);
        assert!(fb.n_displayed() <= 1 + fb.entries().iter().filter(|e| e.selection == Selection::Yes).count());
    }

    #[test]
    fn mark_cull_idempotence_on_idle_box_is_empty() {
        let mut fb = FileBox::new(Ordering::Ls);
        fb.add(b"a", FileType::Regular, Selection::No);
        fb.unmark_all();
        fb.cull();
        assert!(fb.entries().is_empty());
    }

    #[test]
    fn protocol_frame_scenario_ordering() {
        // Scenario 4: foo (dir, yes), bar (regular, no) => ls-order bar, foo.
        let mut fb = FileBox::new(Ordering::Ls);
        fb.add(b"foo", FileType::Directory, Selection::Yes);
        fb.add(b"bar", FileType::Regular, Selection::No);
        let names: Vec<_> = fb.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec![b"bar".to_vec(), b"foo".to_vec()]);
    }
}
