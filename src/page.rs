//! Defines [`Page`], one page of an ordered sequence of items.

/// One page of an ordered sequence. Pages are numbered from 1.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// The 1-based number of this page.
    pub number: usize,

    pub per_page: usize,

    /// The length of the whole sequence.
    pub total: usize,
}

impl<T> Page<T> {
    /// Takes page `number` of size `per_page` out of `items`. A `number` of
    /// 0 means the first page and a `per_page` of 0 means 1. A page past the
    /// end has no items.
    pub fn paginate<I: IntoIterator<Item = T>>(
        items: I,
        number: usize,
        per_page: usize,
    ) -> Page<T> {
        let number = number.max(1);
        let per_page = per_page.max(1);
        let mut total = 0;
        let skip = (number - 1).saturating_mul(per_page);
        let mut page = Vec::new();
        for item in items {
            if total >= skip && page.len() < per_page {
                page.push(item);
            }
            total += 1;
        }
        Page {
            items: page,
            number,
            per_page,
            total,
        }
    }

    /// The number of pages in the sequence. An empty sequence has no pages.
    pub fn pages(&self) -> usize {
        let partial = self.total % self.per_page != 0;
        self.total / self.per_page + usize::from(partial)
    }

    pub fn has_next(&self) -> bool {
        self.number < self.pages()
    }

    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn next_num(&self) -> Option<usize> {
        if self.has_next() {
            Some(self.number + 1)
        } else {
            None
        }
    }

    pub fn prev_num(&self) -> Option<usize> {
        if self.has_prev() {
            Some(self.number - 1)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_middle_page() {
        let page = Page::paginate(1..=12, 2, 5);
        assert_eq!(vec![6, 7, 8, 9, 10], page.items);
        assert_eq!(12, page.total);
        assert_eq!(3, page.pages());
        assert!(page.has_next() && page.has_prev());
        assert_eq!(Some(3), page.next_num());
        assert_eq!(Some(1), page.prev_num());
    }

    #[test]
    fn test_last_page_is_partial() {
        let page = Page::paginate(1..=12, 3, 5);
        assert_eq!(vec![11, 12], page.items);
        assert!(!page.has_next());
        assert_eq!(None, page.next_num());
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let page = Page::paginate(1..=3, 0, 2);
        assert_eq!(1, page.number);
        assert_eq!(vec![1, 2], page.items);
        assert!(!page.has_prev());
    }

    #[test]
    fn test_zero_page_size() {
        let page = Page::paginate(1..=3, 2, 0);
        assert_eq!(vec![2], page.items);
        assert_eq!(3, page.pages());
    }

    #[test]
    fn test_past_the_end() {
        let page = Page::paginate(1..=3, 9, 5);
        assert!(page.is_empty());
        assert!(page.has_prev());
        assert!(!page.has_next());
    }

    #[test]
    fn test_empty_sequence() {
        let page = Page::paginate(Vec::<u8>::new(), 1, 5);
        assert_eq!(0, page.pages());
        assert!(!page.has_next() && !page.has_prev());
    }

    #[test]
    fn test_huge_page_size() {
        let page = Page::paginate(1..=3, 1, usize::MAX);
        assert_eq!(vec![1, 2, 3], page.items);
        assert_eq!(1, page.pages());
        assert!(!page.has_next());

        let page = Page::paginate(1..=3, 2, usize::MAX);
        assert!(page.is_empty());
        assert_eq!(None, page.next_num());
    }
}
