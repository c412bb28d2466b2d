

mod test_cursor;
