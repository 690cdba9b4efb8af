//! Borrowing views over a message's parameters.

use std::iter::FusedIterator;
use std::slice;

use crate::message::{Param, ParamHeader};

/// One parameter: its type tag and a borrowed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamRef<'a> {
    header: ParamHeader,
    data: &'a [u8],
}

impl<'a> ParamRef<'a> {
    pub fn param_type(&self) -> u16 {
        self.header.param_type()
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> u32 {
        self.header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload as UTF-8, if it is valid.
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.data).ok()
    }
}

/// Forward iterator over parameters in wire order.
///
/// Never mutates the message; clone it or ask the message for a new one to
/// start over.
#[derive(Debug, Clone)]
pub struct Params<'a> {
    inner: slice::Iter<'a, Param>,
}

impl<'a> Params<'a> {
    pub(crate) fn new(params: &'a [Param]) -> Self {
        Self {
            inner: params.iter(),
        }
    }
}

impl<'a> Iterator for Params<'a> {
    type Item = ParamRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|p| ParamRef {
            header: p.header,
            data: &p.data,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.inner.nth(n).map(|p| ParamRef {
            header: p.header,
            data: &p.data,
        })
    }
}

impl ExactSizeIterator for Params<'_> {}

impl FusedIterator for Params<'_> {}

#[cfg(test)]
mod tests {
    use crate::message::Message;

    fn sample() -> Message {
        let mut msg = Message::new(1, 1, 0);
        msg.add_str(10, "alpha").unwrap();
        msg.add_str(20, "beta").unwrap();
        msg.add_str(10, "gamma").unwrap();
        msg.add_param(30, b"").unwrap();
        msg
    }

    #[test]
    fn iterates_in_order() {
        let msg = sample();
        let types: Vec<u16> = msg.params().map(|p| p.param_type()).collect();
        assert_eq!(types, vec![10, 20, 10, 30]);
        assert_eq!(msg.params().len(), 4);
    }

    #[test]
    fn restart_by_cloning() {
        let msg = sample();
        let mut it = msg.params();
        it.next();
        let snapshot = it.clone();
        assert_eq!(it.count(), 3);
        assert_eq!(snapshot.count(), 3);
        assert_eq!(msg.params().count(), 4);
    }

    #[test]
    fn by_index() {
        let msg = sample();
        let p = msg.param(1).unwrap();
        assert_eq!(p.param_type(), 20);
        assert_eq!(p.data(), b"beta");
        assert_eq!(p.len(), 4);
        assert!(msg.param(4).is_none());
    }

    #[test]
    fn by_type_returns_first_match() {
        let msg = sample();
        assert_eq!(msg.param_by_type(10).unwrap().as_str(), Some("alpha"));
        assert!(msg.param_by_type(99).is_none());
    }

    #[test]
    fn successive_matches_of_a_type() {
        let msg = sample();
        let texts: Vec<&str> = msg
            .params_by_type(10)
            .filter_map(|p| p.as_str())
            .collect();
        assert_eq!(texts, vec!["alpha", "gamma"]);
    }

    #[test]
    fn param_str_skips_empty_payload() {
        let msg = sample();
        assert_eq!(msg.param_str(20), Some("beta"));
        assert_eq!(msg.param_str(30), None);
    }

    #[test]
    fn param_str_rejects_invalid_utf8() {
        let mut msg = Message::new(1, 1, 0);
        msg.add_param(5, &[0xC3, 0x28]).unwrap();
        assert_eq!(msg.param_str(5), None);
        assert_eq!(msg.param_by_type(5).unwrap().data(), &[0xC3, 0x28]);
    }
}
